use std::time::Duration;
use anyhow::Result;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use shared::types::{Entry, EntryEvent};
use crate::notifier::Notifier;
use crate::reconcile::{reconcile, Outcome};
use crate::resolver::Resolver;
use crate::store::StoreHandle;

/// The single writer of the entry log.
///
/// Keeps the current tail in memory so a poll does not need to read it back
/// from the store. The cached tail only moves after the store has confirmed
/// the write.
pub struct Poller<R> {
    resolver: R,
    store: StoreHandle,
    notifier: Notifier,
    previous: Option<Entry>,
}

impl<R: Resolver> Poller<R> {
    /// Seed the cached tail from the store
    pub async fn new(resolver: R, store: StoreHandle, notifier: Notifier) -> Result<Self> {
        let previous = store.latest().await?;
        match &previous {
            Some(entry) => tracing::info!(
                "Resuming after entry {} ({}, since {:?})",
                entry.id,
                entry.ip,
                entry.started_at()
            ),
            None => tracing::info!("Entry log is empty"),
        }

        Ok(Self {
            resolver,
            store,
            notifier,
            previous,
        })
    }

    pub fn previous(&self) -> Option<&Entry> {
        self.previous.as_ref()
    }

    /// One poll cycle: resolve, reconcile, persist, notify
    pub async fn poll_once(&mut self) -> Result<EntryEvent> {
        let timestamp = Utc::now().timestamp_millis();
        let ip = self.resolver.resolve().await;
        self.record(timestamp, ip).await
    }

    /// Apply one observation to the log and publish the resulting event
    pub async fn record(&mut self, timestamp: i64, ip: String) -> Result<EntryEvent> {
        let event = match reconcile(self.previous.as_ref(), &ip, timestamp) {
            Outcome::Extend { id, timestamp } => {
                let entry = self.store.touch(id, timestamp).await?;
                tracing::debug!(
                    "Extended entry {} ({}) to {}, held for {}ms",
                    entry.id,
                    entry.ip,
                    entry.last_updated,
                    entry.span_ms()
                );
                EntryEvent::Updated(entry)
            }
            Outcome::New { ip, timestamp, changed_after } => {
                let entry = self.store.create(ip, timestamp, timestamp, changed_after).await?;
                tracing::info!(
                    "Logged new entry {}: ip={} timestamp={} changed_after={}ms",
                    entry.id,
                    entry.ip,
                    entry.timestamp,
                    entry.changed_after
                );
                if entry.is_sentinel() {
                    tracing::warn!("Address lookup failing since {:?}", entry.started_at());
                }
                EntryEvent::Created(entry)
            }
        };

        self.previous = Some(event.entry().clone());
        self.notifier.publish(event.clone());

        Ok(event)
    }

    /// Re-read the tail from the store after a failed write
    async fn resync(&mut self) {
        match self.store.latest().await {
            Ok(latest) => self.previous = latest,
            Err(e) => tracing::debug!("Could not resync tail entry: {}", e),
        }
    }

    /// Poll every `interval` until cancelled.
    ///
    /// Cycles run inline, so a slow lookup delays the next tick instead of
    /// overlapping it. A cycle in flight always completes.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Watching public IP every {:?}, current tail: {:?}",
            interval,
            self.previous().map(|entry| entry.ip.as_str())
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!("Failed to record poll result: {:#}", e);
                        self.resync().await;
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Poller shutting down");
                    break;
                }
            }
        }
    }
}
