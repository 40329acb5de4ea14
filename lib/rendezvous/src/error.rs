// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for rendezvous operations.

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

/// Failures surfaced by [`RendezvousMap`](crate::RendezvousMap) operations.
///
/// Keys are rendered with their `Debug` form so the error type stays
/// independent of the key type.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum RendezvousError {
    /// A second `wait` arrived for a key that already has a parked waiter.
    #[error("a waiter is already registered for key {key}")]
    DuplicateWaiter { key: String },

    /// A `set` arrived for a key whose previous value was never collected.
    #[error("an uncollected value is already stored for key {key}")]
    DuplicateKey { key: String },

    /// The completion slot for the key was already final.
    #[error("the completion for key {key} is already resolved")]
    AlreadyResolved { key: String },

    /// The wait was cancelled, cleared or the map was disposed.
    #[error("wait for key {key} was cancelled")]
    Cancelled { key: String },

    /// The pending entry outlived the configured time-to-live and was evicted.
    #[error("pending entry for key {key} expired before it was matched")]
    Expired { key: String },

    /// The map was disposed; no further rendezvous are accepted.
    #[error("rendezvous map has been disposed")]
    Disposed,

    /// The map was built from an invalid configuration.
    #[error("invalid rendezvous configuration: {0}")]
    Config(String),

    /// TTL eviction was requested outside of a Tokio runtime.
    #[error("stale item eviction requires a Tokio runtime: {0}")]
    Runtime(Arc<tokio::runtime::TryCurrentError>),

    /// Failure chosen by a wait-cancelled hook.
    #[error("{0}")]
    Custom(Arc<anyhow::Error>),
}

impl RendezvousError {
    pub(crate) fn duplicate_waiter(key: &impl Debug) -> Self {
        Self::DuplicateWaiter {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn duplicate_key(key: &impl Debug) -> Self {
        Self::DuplicateKey {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn already_resolved(key: &impl Debug) -> Self {
        Self::AlreadyResolved {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn cancelled(key: &impl Debug) -> Self {
        Self::Cancelled {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn expired(key: &impl Debug) -> Self {
        Self::Expired {
            key: format!("{key:?}"),
        }
    }

    /// Wrap an arbitrary error so a cancellation hook can fail a wait with it.
    pub fn custom(err: impl Into<anyhow::Error>) -> Self {
        Self::Custom(Arc::new(err.into()))
    }

    /// Returns `true` for the standard cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<tokio::runtime::TryCurrentError> for RendezvousError {
    fn from(err: tokio::runtime::TryCurrentError) -> Self {
        Self::Runtime(Arc::new(err))
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RendezvousError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_key() {
        let err = RendezvousError::duplicate_waiter(&"order-7");
        assert_eq!(
            err.to_string(),
            "a waiter is already registered for key \"order-7\""
        );

        let err = RendezvousError::duplicate_key(&42u64);
        assert_eq!(
            err.to_string(),
            "an uncollected value is already stored for key 42"
        );
    }

    #[test]
    fn custom_displays_inner_error() {
        let err = RendezvousError::custom(anyhow::anyhow!("upstream timed out"));
        assert_eq!(err.to_string(), "upstream timed out");
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancelled_predicate() {
        assert!(RendezvousError::cancelled(&1).is_cancelled());
        assert!(!RendezvousError::expired(&1).is_cancelled());
        assert!(!RendezvousError::Disposed.is_cancelled());
    }
}
