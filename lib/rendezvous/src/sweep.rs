// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Background eviction of entries that were never matched.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::saturating_millis;
use crate::error::{RendezvousError, Result};
use crate::map::Inner;

/// Spawn the sweeper for `inner` on the current runtime.
///
/// The task holds only a weak reference, so it never keeps a dropped map
/// alive, and it exits when the map is disposed.
pub(crate) fn spawn_sweeper<K, V>(inner: &Arc<Inner<K, V>>, ttl: Duration, period: Duration) -> Result<()>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    let handle = Handle::try_current()?;
    let weak = Arc::downgrade(inner);
    let shutdown = inner.shutdown_token();

    tracing::debug!(
        map = %inner.name(),
        ttl_ms = saturating_millis(ttl),
        period_ms = saturating_millis(period),
        "starting stale entry sweeper"
    );

    inner
        .tasks()
        .spawn_on(stale_sweeper(weak, shutdown, ttl, period), &handle);
    Ok(())
}

async fn stale_sweeper<K, V>(
    map: Weak<Inner<K, V>>,
    shutdown: CancellationToken,
    ttl: Duration,
    period: Duration,
) where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = map.upgrade() else {
                    break;
                };
                evict_stale(&inner, ttl);
            }
        }
    }

    tracing::trace!("stale entry sweeper stopped");
}

/// Remove every entry created more than `ttl` ago. Returns the number of
/// entries evicted.
pub(crate) fn evict_stale<K, V>(inner: &Inner<K, V>, ttl: Duration) -> usize
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    let Some(cutoff) = Instant::now().checked_sub(ttl) else {
        return 0;
    };

    let mut evicted = 0;
    for (key, entry) in inner.snapshot() {
        if !entry.created_before(cutoff) {
            continue;
        }

        // the snapshot may be stale: only evict the entry we looked at
        if !inner.release(&key, &entry) {
            tracing::warn!(map = %inner.name(), ?key, "stale entry left the map before eviction");
            continue;
        }
        evicted += 1;

        if inner.cancel_evicted() && entry.completion().fail(RendezvousError::expired(&key)) {
            tracing::trace!(map = %inner.name(), ?key, "evicted pending entry; waiter expired");
        } else {
            tracing::trace!(map = %inner.name(), ?key, status = ?entry.status(), "evicted stale entry");
        }
    }

    if evicted > 0 {
        tracing::debug!(map = %inner.name(), evicted, "stale entries evicted");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use crate::{RendezvousConfig, RendezvousError, RendezvousMap};
    use std::time::Duration;

    fn sweeping_map(cancel_evicted: bool) -> anyhow::Result<RendezvousMap<&'static str, u32>> {
        let config = RendezvousConfig::builder()
            .name("sweep-test")
            .stale_item_ttl_ms(100)
            .sweep_interval_ms(10)
            .cancel_evicted(cancel_evicted)
            .build()?;
        Ok(RendezvousMap::builder().config(config).build()?)
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_waiter_expires() -> anyhow::Result<()> {
        let map = sweeping_map(true)?;

        let waiter = tokio::spawn({
            let map = map.clone();
            async move { map.wait("job", None).await }
        });
        tokio::task::yield_now().await;
        assert!(map.contains_key(&"job"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!map.contains_key(&"job"));

        let err = waiter.await?.unwrap_err();
        assert!(matches!(err, RendezvousError::Expired { .. }));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_waiter_stays_parked_without_cancel() -> anyhow::Result<()> {
        let map = sweeping_map(false)?;

        let waiter = tokio::spawn({
            let map = map.clone();
            async move { map.wait("job", None).await }
        });
        tokio::task::yield_now().await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!map.contains_key(&"job"));
        assert!(!waiter.is_finished());

        // a later set no longer reaches the abandoned waiter
        map.set("job", 1)?;
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        assert!(map.contains_key(&"job"));

        // the map-wide token still releases it
        map.dispose();
        let err = waiter.await?.unwrap_err();
        assert!(err.is_cancelled());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn uncollected_values_expire_too() -> anyhow::Result<()> {
        let map = sweeping_map(true)?;
        map.set("orphan", 9)?;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(map.contains_key(&"orphan"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(map.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_survive_a_sweep() -> anyhow::Result<()> {
        let map = sweeping_map(true)?;
        map.set("old", 1)?;
        tokio::time::sleep(Duration::from_millis(80)).await;
        map.set("new", 2)?;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!map.contains_key(&"old"));
        assert!(map.contains_key(&"new"));
        assert_eq!(map.wait("new", None).await?, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_joins_the_sweeper() -> anyhow::Result<()> {
        let map = sweeping_map(true)?;
        map.set("k", 1)?;

        map.shutdown().await;
        assert!(map.is_disposed());
        assert!(map.is_empty());
        Ok(())
    }

    #[test]
    fn ttl_outside_runtime_is_rejected() {
        let err = RendezvousMap::<u8, u8>::builder()
            .stale_item_ttl(Duration::from_millis(5))
            .build()
            .unwrap_err();
        assert!(matches!(err, RendezvousError::Runtime(_)));
    }
}
