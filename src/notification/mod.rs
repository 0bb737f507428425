//! Turning an Alertmanager message into a DingTalk robot call.
//!
//! [`builder`] renders the notification, [`dingtalk`] delivers it to the
//! target robot, and [`fanout`] forwards a copy of the raw message to an
//! optional secondary sink.
pub mod builder;
pub mod dingtalk;
pub mod fanout;

pub use builder::{BuildError, NotificationBuilder};
pub use dingtalk::{send_notification, DispatchError};
pub use fanout::{FanoutError, FanoutSink};

use std::time::Duration;

/// Builds a client for outbound calls.
///
/// Idle connections are never pooled, so every call opens its own
/// connection and nothing survives a configuration reload.
pub fn outbound_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("dingrelay/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeout)
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .build()
}
