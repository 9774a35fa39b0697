//! Background maintenance of the [`AccountCache`].
//!
//! Two tokio tasks run side by side: one flushes dirty accounts, the other
//! evicts idle ones. [`Scheduler::shutdown`] stops both and drains the cache.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::{AccountCache, CacheSettings, FlushReport, Presence};

#[derive(Debug)]
pub struct Scheduler {
    cache: Arc<AccountCache>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the flush and eviction tasks. Must be called from inside a
    /// tokio runtime.
    pub fn start(
        cache: Arc<AccountCache>,
        settings: &CacheSettings,
        presence: Arc<dyn Presence>,
    ) -> Self {
        let (stop, _) = watch::channel(false);

        let flush = {
            let cache = cache.clone();
            every(settings.flush_interval(), stop.subscribe(), move || {
                let cache = cache.clone();
                async move {
                    cache.flush_dirty().await;
                }
            })
        };

        let idle_ttl = settings.idle_ttl();
        let eviction = {
            let cache = cache.clone();
            every(settings.eviction_interval(), stop.subscribe(), move || {
                let cache = cache.clone();
                let presence = presence.clone();
                async move {
                    cache.evict_idle(idle_ttl, presence.as_ref()).await;
                }
            })
        };

        tracing::info!(
            flush_every = ?settings.flush_interval(),
            evict_every = ?settings.eviction_interval(),
            ?idle_ttl,
            "cache maintenance started"
        );

        Self {
            cache,
            stop,
            tasks: vec![flush, eviction],
        }
    }

    pub fn cache(&self) -> &Arc<AccountCache> {
        &self.cache
    }

    /// Stops both tasks, waits for any pass in progress, then saves every
    /// dirty account.
    pub async fn shutdown(self) -> FlushReport {
        // Receivers only disappear once their task ended.
        let _ = self.stop.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!("cache maintenance task failed: {err}");
            }
        }

        let report = self.cache.flush_dirty().await;
        if report.failed > 0 {
            tracing::error!(
                "{} accounts could not be saved during shutdown",
                report.failed
            );
        }
        tracing::info!("cache maintenance stopped, {} accounts saved", report.saved);
        report
    }
}

fn every<F, Fut>(period: Duration, mut stop: watch::Receiver<bool>, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => job().await,
                _ = stop.changed() => break,
            }
        }
    })
}
