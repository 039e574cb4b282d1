//! Background half of the engine: turns new telemetry into notifications.
//!
//! Each tick snapshots all subscriptions and handles them independently. A
//! subscription's watermark only moves after its notification was delivered,
//! so a failed send is retried on the next tick with the same reading.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::{Error, Result};
use crate::metrics::{
    NOTIFICATIONS_SENT_TOTAL, NOTIFICATION_FAILURES_TOTAL, SUBSCRIPTIONS, TELEMETRY_FAILURES_TOTAL,
    TICKS_TOTAL, TICK_DURATION_SECONDS,
};
use crate::model::{format_message, Subscription};
use crate::notify::Notifier;
use crate::store::SubscriptionStore;
use crate::telemetry::TelemetrySource;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    /// Upper bound for one telemetry lookup or one notification send.
    pub timeout: Duration,
    /// Subscriptions processed at the same time within a tick.
    pub concurrency: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(10),
            concurrency: 16,
        }
    }
}

/// Per-tick counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub scanned: usize,
    pub notified: usize,
    pub up_to_date: usize,
    pub no_reading: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Notified,
    UpToDate,
    NoReading,
    Failed,
}

#[derive(Clone)]
pub struct PollCycle {
    store: Arc<dyn SubscriptionStore>,
    telemetry: Arc<dyn TelemetrySource>,
    notifier: Arc<dyn Notifier>,
    config: PollConfig,
}

impl PollCycle {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        telemetry: Arc<dyn TelemetrySource>,
        notifier: Arc<dyn Notifier>,
        config: PollConfig,
    ) -> Self {
        Self {
            store,
            telemetry,
            notifier,
            config,
        }
    }

    /// Runs ticks on the configured interval until `shutdown` flips to true
    /// or its sender is dropped. The first tick fires immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting poll cycle with interval={:?}, concurrency={}",
            self.config.interval, self.config.concurrency
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if report.notified > 0 || report.failed > 0 => {
                            info!(?report, "Poll tick finished");
                        }
                        Ok(report) => debug!(?report, "Poll tick finished"),
                        // Store unavailable: nothing to do until the next tick
                        Err(e) => error!("Poll tick aborted: {}", e),
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Poll cycle stopped");
    }

    /// Processes one snapshot of every subscription.
    ///
    /// Only a failure to read the snapshot is returned as an error; problems
    /// with individual subscriptions are counted in the report.
    pub async fn tick(&self) -> Result<TickReport> {
        TICKS_TOTAL.inc();
        let start = Instant::now();

        let subscriptions = self.store.list_all().await?;
        SUBSCRIPTIONS.set(subscriptions.len() as f64);

        let mut report = TickReport {
            scanned: subscriptions.len(),
            ..TickReport::default()
        };

        let outcomes: Vec<Outcome> = stream::iter(subscriptions)
            .map(|subscription| {
                let cycle = self.clone();
                async move { cycle.process(subscription).await }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Notified => report.notified += 1,
                Outcome::UpToDate => report.up_to_date += 1,
                Outcome::NoReading => report.no_reading += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        TICK_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
        Ok(report)
    }

    async fn process(&self, subscription: Subscription) -> Outcome {
        let limit = self.config.timeout;

        let reading = match with_timeout(limit, self.telemetry.latest_reading(&subscription.device)).await {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                debug!(device = %subscription.device, "No readings for device");
                return Outcome::NoReading;
            }
            Err(e) => {
                TELEMETRY_FAILURES_TOTAL.inc();
                warn!(
                    subscription = %subscription.id,
                    device = %subscription.device,
                    "Telemetry lookup failed: {}", e
                );
                return Outcome::Failed;
            }
        };

        if reading.timestamp <= subscription.watermark {
            return Outcome::UpToDate;
        }

        let text = format_message(&subscription.device, &reading);
        if let Err(e) = with_timeout(limit, self.notifier.send(subscription.user_id, &text)).await {
            NOTIFICATION_FAILURES_TOTAL.inc();
            warn!(
                subscription = %subscription.id,
                user_id = subscription.user_id,
                device = %subscription.device,
                "Notification failed, will retry next tick: {}", e
            );
            return Outcome::Failed;
        }
        NOTIFICATIONS_SENT_TOTAL.inc();

        match self
            .store
            .update_watermark(subscription.id, reading.timestamp)
            .await
        {
            Ok(true) => {
                info!(
                    subscription = %subscription.id,
                    user_id = subscription.user_id,
                    device = %subscription.device,
                    watermark = reading.timestamp,
                    "Notified subscriber"
                );
            }
            Ok(false) => {
                debug!(
                    subscription = %subscription.id,
                    "Watermark not advanced, subscription removed or already newer"
                );
            }
            Err(e) => {
                // The reading stays unacknowledged and is delivered again
                error!(
                    subscription = %subscription.id,
                    "Failed to store watermark {}: {}", reading.timestamp, e
                );
            }
        }

        Outcome::Notified
    }
}

async fn with_timeout<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))?
}
