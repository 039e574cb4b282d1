//! Device telemetry subscriptions over Telegram.
//!
//! Users subscribe to devices with chat commands ([`bot`]); the
//! [`manager::SubscriptionManager`] validates and records those requests, and
//! the [`poll::PollCycle`] periodically compares each subscription's
//! watermark with the device's latest reading, notifying the user about
//! anything newer.

pub mod bot;
pub mod config;
pub mod db;
pub mod errors;
pub mod manager;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod poll;
pub mod rest;
pub mod store;
pub mod telemetry;
pub mod validate;
