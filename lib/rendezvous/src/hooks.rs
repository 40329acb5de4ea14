// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Optional callbacks consulted by the map at four junctures.
//!
//! Hooks are collected into a [`RendezvousHooks`] value before the map is
//! built and are read-only afterwards. Every slot is optional; when a slot is
//! empty the map falls back to its default behavior:
//!
//! | Hook | Invoked | Default |
//! |---|---|---|
//! | `on_set_duplicate` | `set` finds an uncollected value | fail with `DuplicateKey` |
//! | `on_set_completed` | after a successful `set` | nothing |
//! | `on_wait_completed` | after a `wait` received its value | nothing |
//! | `on_wait_cancelled` | a parked `wait` observes its token | fail with `Cancelled` |

use std::fmt;
use std::sync::Arc;

use crate::slot::Completion;

/// Merges the uncollected value with the newly supplied one.
pub type DuplicateHook<V> = Arc<dyn Fn(V, V) -> V + Send + Sync>;

/// Notification carrying the key that completed.
pub type CompletedHook<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Decides the outcome of a cancelled wait.
///
/// Receives the key, the pending completion and whether the caller supplied
/// its own cancellation token (`false` means the map-wide token fired, i.e.
/// the map is being disposed).
pub type CancelledHook<K, V> = Arc<dyn Fn(&K, &Completion<V>, bool) + Send + Sync>;

/// Immutable set of optional callbacks handed to the map at construction.
pub struct RendezvousHooks<K, V> {
    duplicate: Option<DuplicateHook<V>>,
    set_completed: Option<CompletedHook<K>>,
    wait_completed: Option<CompletedHook<K>>,
    wait_cancelled: Option<CancelledHook<K, V>>,
}

impl<K, V> RendezvousHooks<K, V> {
    /// Empty hook set; every juncture uses its default behavior.
    pub fn new() -> Self {
        Self {
            duplicate: None,
            set_completed: None,
            wait_completed: None,
            wait_cancelled: None,
        }
    }

    /// Merge an uncollected value with a duplicate `set` as `f(old, new)`.
    ///
    /// The merged value is stored under the key for the next waiter. The
    /// hook runs while the key is locked and must not call back into the map.
    pub fn on_set_duplicate<F>(mut self, f: F) -> Self
    where
        F: Fn(V, V) -> V + Send + Sync + 'static,
    {
        self.duplicate = Some(Arc::new(f));
        self
    }

    /// Called after every successful `set`, outside of any map lock.
    pub fn on_set_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.set_completed = Some(Arc::new(f));
        self
    }

    /// Called after a `wait` received its value, before the value is returned.
    pub fn on_wait_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.wait_completed = Some(Arc::new(f));
        self
    }

    /// Replace the default cancellation outcome.
    ///
    /// The hook is expected to complete the slot, typically with
    /// [`Completion::fail`]. If it leaves the slot pending, the wait stays
    /// parked and a later `set` can still deliver to it.
    pub fn on_wait_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, &Completion<V>, bool) + Send + Sync + 'static,
    {
        self.wait_cancelled = Some(Arc::new(f));
        self
    }

    pub(crate) fn duplicate(&self) -> Option<&DuplicateHook<V>> {
        self.duplicate.as_ref()
    }

    pub(crate) fn set_completed(&self, key: &K) {
        if let Some(hook) = &self.set_completed {
            hook(key);
        }
    }

    pub(crate) fn wait_completed(&self, key: &K) {
        if let Some(hook) = &self.wait_completed {
            hook(key);
        }
    }

    /// Returns `false` when no hook is registered.
    pub(crate) fn wait_cancelled(
        &self,
        key: &K,
        completion: &Completion<V>,
        caller_token: bool,
    ) -> bool {
        match &self.wait_cancelled {
            Some(hook) => {
                hook(key, completion, caller_token);
                true
            }
            None => false,
        }
    }
}

impl<K, V> Default for RendezvousHooks<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for RendezvousHooks<K, V> {
    fn clone(&self) -> Self {
        Self {
            duplicate: self.duplicate.clone(),
            set_completed: self.set_completed.clone(),
            wait_completed: self.wait_completed.clone(),
            wait_cancelled: self.wait_cancelled.clone(),
        }
    }
}

impl<K, V> fmt::Debug for RendezvousHooks<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendezvousHooks")
            .field("on_set_duplicate", &self.duplicate.is_some())
            .field("on_set_completed", &self.set_completed.is_some())
            .field("on_wait_completed", &self.wait_completed.is_some())
            .field("on_wait_cancelled", &self.wait_cancelled.is_some())
            .finish()
    }
}
