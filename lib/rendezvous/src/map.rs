// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The rendezvous store: admission protocol, cancellation and disposal.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};
use validator::Validate;

use crate::config::{RendezvousConfig, saturating_millis};
use crate::error::{RendezvousError, Result};
use crate::hooks::RendezvousHooks;
use crate::slot::{CompletionStatus, Entry};
use crate::sweep;

/// Thread-safe rendezvous point where a `wait` and a `set` for the same key
/// meet, regardless of which side arrives first.
///
/// - `wait` first: the waiter parks until a `set` supplies the value.
/// - `set` first: the value is stored until a `wait` collects it.
///
/// Once matched, the entry leaves the map, so every key is consumed at most
/// once per cycle. Cloning the map produces another handle to the same store.
pub struct RendezvousMap<K, V> {
    inner: Arc<Inner<K, V>>,
}

/// Builder for [`RendezvousMap`].
pub struct RendezvousMapBuilder<K, V> {
    config: RendezvousConfig,
    hooks: RendezvousHooks<K, V>,
}

pub(crate) struct Inner<K, V> {
    config: RendezvousConfig,
    entries: DashMap<K, Arc<Entry<V>>>,
    hooks: RendezvousHooks<K, V>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    disposed: AtomicBool,
}

enum WaitAdmission<V> {
    /// Fresh pending entry; the waiter must park on it.
    Parked(Arc<Entry<V>>),
    /// The value (or failure) is already there.
    Ready(Arc<Entry<V>>),
}

impl<K, V> RendezvousMapBuilder<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Replace the whole configuration.
    pub fn config(mut self, config: RendezvousConfig) -> Self {
        self.config = config;
        self
    }

    /// Label used on log lines.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Evict unmatched entries older than `ttl`. `Duration::ZERO` disables
    /// eviction.
    pub fn stale_item_ttl(mut self, ttl: Duration) -> Self {
        self.config.stale_item_ttl_ms = saturating_millis(ttl);
        self
    }

    /// Period of the eviction sweep; defaults to the TTL.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval_ms = Some(saturating_millis(interval));
        self
    }

    /// Install the extension hooks.
    pub fn hooks(mut self, hooks: RendezvousHooks<K, V>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Build the map, starting the eviction sweep when a TTL is configured.
    ///
    /// Eviction needs a Tokio runtime; building with a TTL outside of one
    /// fails with [`RendezvousError::Runtime`].
    pub fn build(self) -> Result<RendezvousMap<K, V>> {
        self.config
            .validate()
            .map_err(|e| RendezvousError::Config(e.to_string()))?;

        let inner = Arc::new(Inner {
            config: self.config,
            entries: DashMap::new(),
            hooks: self.hooks,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            disposed: AtomicBool::new(false),
        });

        if let Some(ttl) = inner.config.stale_item_ttl() {
            sweep::spawn_sweeper(&inner, ttl, inner.config.sweep_interval())?;
        }

        Ok(RendezvousMap { inner })
    }
}

impl<K, V> RendezvousMap<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Map without hooks and without eviction.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RendezvousConfig::default(),
                entries: DashMap::new(),
                hooks: RendezvousHooks::new(),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Start a builder with default configuration and no hooks.
    pub fn builder() -> RendezvousMapBuilder<K, V> {
        RendezvousMapBuilder {
            config: RendezvousConfig::default(),
            hooks: RendezvousHooks::new(),
        }
    }

    /// Wait for the value of `key`.
    ///
    /// Parks until a matching [`set`](Self::set) arrives, or returns at once
    /// if the value is already stored. Without a `cancel` token the map-wide
    /// token is used, so [`dispose`](Self::dispose) cancels the wait.
    ///
    /// # Errors
    /// - [`RendezvousError::DuplicateWaiter`] if another wait is parked on `key`
    /// - [`RendezvousError::Cancelled`] (or the cancellation hook's choice)
    ///   when the token fires first
    /// - [`RendezvousError::Expired`] if the entry is evicted while parked
    /// - [`RendezvousError::Disposed`] after disposal
    pub async fn wait(&self, key: K, cancel: Option<CancellationToken>) -> Result<V> {
        self.inner.ensure_open()?;

        let caller_token = cancel.is_some();
        let token = cancel.unwrap_or_else(|| self.inner.shutdown.clone());

        let entry = match self.inner.admit_waiter(&key)? {
            WaitAdmission::Ready(entry) => {
                let outcome = entry.completion().try_take();
                return self.inner.finish_wait(&key, outcome);
            }
            WaitAdmission::Parked(entry) => entry,
        };

        // a concurrent dispose may have drained the map before we parked
        if self.is_disposed() {
            entry.completion().fail(RendezvousError::Disposed);
        }

        let _release = ParkedWaiter {
            inner: &self.inner,
            key: &key,
            entry: &entry,
        };

        let cancelled = token.cancelled();
        tokio::pin!(cancelled);
        let mut cancel_observed = false;

        let outcome = loop {
            tokio::select! {
                biased;
                outcome = entry.completion().wait() => break outcome,
                _ = &mut cancelled, if !cancel_observed => {
                    cancel_observed = true;
                    self.inner.cancel_waiter(&key, &entry, caller_token);
                }
            }
        };

        self.inner.finish_wait(&key, outcome)
    }

    /// Supply the value for `key`.
    ///
    /// Unblocks a parked waiter, or stores the value for the next one.
    ///
    /// # Errors
    /// - [`RendezvousError::DuplicateKey`] if an uncollected value is already
    ///   stored and no duplicate hook is installed
    /// - [`RendezvousError::AlreadyResolved`] if the entry is already final
    /// - [`RendezvousError::Disposed`] after disposal
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.set_inner(key, value, false)
    }

    /// Like [`set`](Self::set), but a duplicate or already-final entry is not
    /// an error: the new value is dropped and the stored one is kept.
    pub fn set_or_ignore(&self, key: K, value: V) -> Result<()> {
        self.set_inner(key, value, true)
    }

    /// Remove the entry for `key` without completing it.
    ///
    /// A waiter parked on the removed entry stays parked until its token
    /// fires.
    pub fn try_remove(&self, key: &K) -> bool {
        let removed = self.inner.entries.remove(key).is_some();
        trace!(map = %self.inner.config.name, ?key, removed, "try_remove");
        removed
    }

    /// Snapshot of the entries matching `predicate`.
    ///
    /// The map is copied first and the predicate runs without holding any map
    /// lock, so concurrent `wait`/`set` calls are not blocked.
    pub fn filter<P>(&self, mut predicate: P) -> Vec<(K, Arc<Entry<V>>)>
    where
        P: FnMut(&K, &Entry<V>) -> bool,
    {
        self.inner
            .snapshot()
            .into_iter()
            .filter(|(key, entry)| predicate(key, entry))
            .collect()
    }

    /// Number of entries currently in the map.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns `true` if an entry exists for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Remove every entry, failing parked waiters with
    /// [`RendezvousError::Cancelled`]. The map stays usable.
    pub fn clear(&self) {
        let cancelled = self.inner.cancel_all();
        debug!(map = %self.inner.config.name, cancelled, "rendezvous map cleared");
    }

    /// Cancel every outstanding wait and reject further operations.
    ///
    /// Idempotent. Waits bound to the map-wide token observe cancellation,
    /// every remaining entry is failed with [`RendezvousError::Cancelled`] and
    /// the eviction sweep stops.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// [`dispose`](Self::dispose), then wait for the eviction sweep to exit.
    pub async fn shutdown(&self) {
        self.inner.dispose();
        self.inner.tasks.wait().await;
    }

    /// Returns `true` once the map has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// The configuration the map was built with.
    pub fn config(&self) -> &RendezvousConfig {
        &self.inner.config
    }

    fn set_inner(&self, key: K, value: V, ignore_resolved: bool) -> Result<()> {
        self.inner.ensure_open()?;
        let stored = self.inner.admit_value(&key, value, ignore_resolved)?;
        self.inner.reject_if_disposed(&key, stored.as_ref())?;
        self.inner.hooks.set_completed(&key);
        Ok(())
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(RendezvousError::Disposed);
        }
        Ok(())
    }

    fn admit_waiter(&self, key: &K) -> Result<WaitAdmission<V>> {
        match self.entries.entry(key.clone()) {
            MapEntry::Vacant(slot) => {
                let entry = Arc::new(Entry::pending());
                slot.insert(Arc::clone(&entry));
                trace!(map = %self.name(), ?key, "waiter parked");
                Ok(WaitAdmission::Parked(entry))
            }
            MapEntry::Occupied(mut slot) => {
                let current = slot.get();
                if current.completion().is_pending() {
                    return Err(RendezvousError::duplicate_waiter(key));
                }
                if !current.has_waiter() && current.status() == CompletionStatus::Resolved {
                    let entry = slot.remove();
                    trace!(map = %self.name(), ?key, "waiter matched stored value");
                    return Ok(WaitAdmission::Ready(entry));
                }

                // another waiter's finished entry on its way out: its outcome
                // belongs to that waiter, so start a fresh cycle
                let entry = Arc::new(Entry::pending());
                slot.insert(Arc::clone(&entry));
                trace!(map = %self.name(), ?key, "waiter replaced a finished entry");
                Ok(WaitAdmission::Parked(entry))
            }
        }
    }

    /// Returns the entry this call left in the map, if any.
    fn admit_value(
        &self,
        key: &K,
        value: V,
        ignore_resolved: bool,
    ) -> Result<Option<Arc<Entry<V>>>> {
        match self.entries.entry(key.clone()) {
            MapEntry::Vacant(slot) => {
                let entry = Arc::new(Entry::resolved(value));
                slot.insert(Arc::clone(&entry));
                trace!(map = %self.name(), ?key, "value stored for a future waiter");
                Ok(Some(entry))
            }
            MapEntry::Occupied(mut slot) => {
                let entry = Arc::clone(slot.get());
                let status = match entry.status() {
                    // a waiter's cell finished by cancellation is never a stored value
                    CompletionStatus::Resolved if entry.has_waiter() => CompletionStatus::Taken,
                    status => status,
                };
                match status {
                    CompletionStatus::Pending => {
                        slot.remove();
                        match entry.completion().resolve(value) {
                            Ok(()) => {
                                trace!(map = %self.name(), ?key, "parked waiter released");
                                Ok(None)
                            }
                            // lost the race against the waiter's cancellation
                            Err(_) if ignore_resolved => Ok(None),
                            Err(_) => Err(RendezvousError::already_resolved(key)),
                        }
                    }
                    CompletionStatus::Resolved => {
                        if let Some(merge) = self.hooks.duplicate() {
                            let Some(old) = entry.completion().take_value() else {
                                return Err(RendezvousError::already_resolved(key));
                            };
                            let merged = Arc::new(Entry::resolved(merge(old, value)));
                            slot.insert(Arc::clone(&merged));
                            trace!(map = %self.name(), ?key, "duplicate value merged");
                            Ok(Some(merged))
                        } else if ignore_resolved {
                            warn!(map = %self.name(), ?key, "duplicate value ignored");
                            Ok(None)
                        } else {
                            Err(RendezvousError::duplicate_key(key))
                        }
                    }
                    CompletionStatus::Failed | CompletionStatus::Taken => {
                        if ignore_resolved {
                            Ok(None)
                        } else {
                            Err(RendezvousError::already_resolved(key))
                        }
                    }
                }
            }
        }
    }

    /// A `set` that passed the open check while `dispose` drained the map
    /// must not leave its value behind.
    fn reject_if_disposed(&self, key: &K, stored: Option<&Arc<Entry<V>>>) -> Result<()> {
        if !self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(entry) = stored {
            self.release(key, entry);
            trace!(map = %self.name(), ?key, "value stored after dispose was dropped");
        }
        Err(RendezvousError::Disposed)
    }

    fn cancel_waiter(&self, key: &K, entry: &Arc<Entry<V>>, caller_token: bool) {
        if !self
            .hooks
            .wait_cancelled(key, entry.completion(), caller_token)
        {
            entry.completion().fail(RendezvousError::cancelled(key));
        }

        // a hook may leave the slot pending; the entry then stays reachable
        if !entry.completion().is_pending() {
            self.release(key, entry);
        }
        trace!(map = %self.name(), ?key, caller_token, "wait cancelled");
    }

    fn finish_wait(&self, key: &K, outcome: Option<Result<V>>) -> Result<V> {
        let value = outcome.unwrap_or_else(|| Err(RendezvousError::already_resolved(key)))?;
        self.hooks.wait_completed(key);
        Ok(value)
    }

    /// Remove `entry` from the map if it is still the one stored for `key`.
    pub(crate) fn release(&self, key: &K, entry: &Arc<Entry<V>>) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    pub(crate) fn snapshot(&self) -> Vec<(K, Arc<Entry<V>>)> {
        self.entries
            .iter()
            .map(|item| (item.key().clone(), Arc::clone(item.value())))
            .collect()
    }

    /// Drop every entry, failing the pending ones. Returns how many waiters
    /// were cancelled.
    fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.entries.retain(|key, entry| {
            if entry.completion().fail(RendezvousError::cancelled(key)) {
                cancelled += 1;
            }
            false
        });
        cancelled
    }

    pub(crate) fn cancel_evicted(&self) -> bool {
        self.config.cancel_evicted
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();
        self.tasks.close();
        let cancelled = self.cancel_all();
        debug!(map = %self.name(), cancelled, "rendezvous map disposed");
    }
}

impl<K, V> Drop for Inner<K, V> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.shutdown.cancel();
            self.tasks.close();
        }
    }
}

/// Releases a parked waiter's entry on every exit path, including the wait
/// future being dropped before completion.
struct ParkedWaiter<'a, K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    inner: &'a Inner<K, V>,
    key: &'a K,
    entry: &'a Arc<Entry<V>>,
}

impl<K, V> Drop for ParkedWaiter<'_, K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    fn drop(&mut self) {
        if self.inner.release(self.key, self.entry) {
            trace!(map = %self.inner.name(), key = ?self.key, "abandoned wait released its entry");
        }
    }
}

impl<K, V> Clone for RendezvousMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for RendezvousMap<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for RendezvousMap<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendezvousMap")
            .field("name", &self.inner.config.name)
            .field("len", &self.inner.entries.len())
            .field("disposed", &self.inner.disposed.load(Ordering::Acquire))
            .field("hooks", &self.inner.hooks)
            .finish()
    }
}
