// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use super::completion::{Completion, CompletionStatus};

/// One rendezvous slot for a key: its completion and when it was created.
///
/// Entries are owned by the map. Handles obtained through
/// [`RendezvousMap::filter`](crate::RendezvousMap::filter) are for
/// inspection; the entry may already have left the map by the time they are
/// looked at.
pub struct Entry<V> {
    completion: Completion<V>,
    created_at: Instant,
    // created by a parked `wait`; only that waiter may consume the outcome
    waiter: bool,
}

impl<V> Entry<V> {
    pub(crate) fn pending() -> Self {
        Self {
            completion: Completion::pending(),
            created_at: Instant::now(),
            waiter: true,
        }
    }

    pub(crate) fn resolved(value: V) -> Self {
        Self {
            completion: Completion::resolved(value),
            created_at: Instant::now(),
            waiter: false,
        }
    }

    /// The entry's completion slot.
    pub fn completion(&self) -> &Completion<V> {
        &self.completion
    }

    /// When the entry was inserted.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time elapsed since insertion.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Shorthand for `completion().status()`.
    pub fn status(&self) -> CompletionStatus {
        self.completion.status()
    }

    pub(crate) fn has_waiter(&self) -> bool {
        self.waiter
    }

    pub(crate) fn created_before(&self, cutoff: Instant) -> bool {
        self.created_at < cutoff
    }
}

impl<V> fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("status", &self.status())
            .field("age", &self.age())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn age_tracks_the_clock() {
        let entry: Entry<()> = Entry::pending();
        tokio::time::advance(Duration::from_millis(250)).await;

        assert_eq!(entry.age(), Duration::from_millis(250));
        assert!(entry.created_before(Instant::now()));
        assert!(!entry.created_before(entry.created_at()));
    }

    #[test]
    fn constructors_set_status() {
        assert_eq!(Entry::<u8>::pending().status(), CompletionStatus::Pending);
        assert_eq!(Entry::resolved(3u8).status(), CompletionStatus::Resolved);
        assert!(Entry::<u8>::pending().has_waiter());
        assert!(!Entry::resolved(3u8).has_waiter());
    }
}
