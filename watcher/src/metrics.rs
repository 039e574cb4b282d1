use crate::errors::Result;
use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref TICKS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "watcher_ticks_total",
        "Total poll ticks started"
    ))
    .unwrap();
    pub static ref TICK_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "watcher_tick_duration_seconds",
            "Time taken to process every subscription in one tick"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    )
    .unwrap();
    pub static ref SUBSCRIPTIONS: Gauge = Gauge::with_opts(Opts::new(
        "watcher_subscriptions",
        "Subscriptions in the last poll snapshot"
    ))
    .unwrap();
    pub static ref NOTIFICATIONS_SENT_TOTAL: Counter = Counter::with_opts(Opts::new(
        "watcher_notifications_sent_total",
        "Notifications delivered to subscribers"
    ))
    .unwrap();
    pub static ref NOTIFICATION_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "watcher_notification_failures_total",
        "Notification deliveries that failed or timed out"
    ))
    .unwrap();
    pub static ref TELEMETRY_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "watcher_telemetry_failures_total",
        "Telemetry lookups that failed or timed out"
    ))
    .unwrap();
    pub static ref STORE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "watcher_store_failures_total",
        "Subscription store operations that returned an error"
    ))
    .unwrap();
    pub static ref COMMANDS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "watcher_commands_total",
        "Chat commands handled"
    ))
    .unwrap();
}

pub fn init_metrics() -> Result<()> {
    REGISTRY.register(Box::new(TICKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TICK_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIPTIONS.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_SENT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATION_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TELEMETRY_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMANDS_TOTAL.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
