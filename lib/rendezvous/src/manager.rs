// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::map::RendezvousMap;
use crate::slot::Entry;

/// The operations a rendezvous store exposes to its callers.
///
/// Consumers that only need to pair producers with waiters can depend on this
/// trait rather than on [`RendezvousMap`] directly, which keeps test doubles
/// and alternative stores pluggable.
pub trait RendezvousManager<K, V>: Send + Sync {
    /// See [`RendezvousMap::wait`].
    fn wait(&self, key: K, cancel: Option<CancellationToken>) -> impl Future<Output = Result<V>> + Send;

    /// See [`RendezvousMap::set`].
    fn set(&self, key: K, value: V) -> Result<()>;

    /// See [`RendezvousMap::try_remove`].
    fn try_remove(&self, key: &K) -> bool;

    /// See [`RendezvousMap::filter`].
    fn filter(&self, predicate: &dyn Fn(&K, &Entry<V>) -> bool) -> Vec<(K, Arc<Entry<V>>)>;

    /// See [`RendezvousMap::dispose`].
    fn dispose(&self);
}

impl<K, V> RendezvousManager<K, V> for RendezvousMap<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    fn wait(&self, key: K, cancel: Option<CancellationToken>) -> impl Future<Output = Result<V>> + Send {
        RendezvousMap::wait(self, key, cancel)
    }

    fn set(&self, key: K, value: V) -> Result<()> {
        RendezvousMap::set(self, key, value)
    }

    fn try_remove(&self, key: &K) -> bool {
        RendezvousMap::try_remove(self, key)
    }

    fn filter(&self, predicate: &dyn Fn(&K, &Entry<V>) -> bool) -> Vec<(K, Arc<Entry<V>>)> {
        RendezvousMap::filter(self, predicate)
    }

    fn dispose(&self) {
        RendezvousMap::dispose(self)
    }
}
