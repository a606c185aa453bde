//! Provisioning lifecycle events and their delivery.
//!
//! The provisioner publishes an event at each lifecycle step of an instance
//! (`cloud/<name>/creating`, `.../requesting`, `.../created`, ...). Delivery is
//! fire-and-forget: failures are logged, never returned to the publisher.
//! Deliveries run as background tasks; call [`Notifier::flush`] before the
//! runtime shuts down so none is cut off.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, ProvisionEvent};
//!
//! # async fn run() {
//! let notifier = Notifier::from_env();
//! notifier.notify(ProvisionEvent::creating("host1", "362", "201", "7"));
//! notifier.flush().await;
//! # }
//! ```
//!
//! # Configuration
//!
//! - `PROVISION_EVENT_WEBHOOK_URL`: webhook receiving every event as JSON
//! - `NOTIFY_DISABLED`: set to "true" to disable all events

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::webhook::WebhookChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{ProvisionEvent, Severity};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Environment variable to disable all events.
const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";

/// Fans events out to every enabled channel in background tasks.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    in_flight: Mutex<JoinSet<()>>,
}

impl Notifier {
    /// Create a notifier from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let disabled = std::env::var(ENV_NOTIFY_DISABLED)
            .is_ok_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
        if disabled {
            info!("Events disabled via {ENV_NOTIFY_DISABLED}");
            return Self::disabled();
        }

        let webhook = WebhookChannel::from_env();
        if !webhook.enabled() {
            debug!("No event channels configured");
            return Self::disabled();
        }
        info!(channel = webhook.name(), "Event delivery initialized");
        Self::with_channels(vec![Arc::new(webhook)])
    }

    /// Create a notifier over the given channels. Disabled channels are dropped.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels: channels.into_iter().filter(|c| c.enabled()).collect(),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// Create a notifier posting to one webhook.
    #[must_use]
    pub fn with_webhook(webhook_url: impl Into<String>) -> Self {
        Self::with_channels(vec![Arc::new(WebhookChannel::new(webhook_url))])
    }

    /// Create a notifier that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_channels(Vec::new())
    }

    /// Whether any event would be delivered.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }

    fn in_flight(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an event for every channel and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Delivery errors are logged.
    pub fn notify(&self, event: ProvisionEvent) {
        if !self.has_channels() {
            debug!(topic = %event.topic(), "No event channels, skipping");
            return;
        }

        let event = Arc::new(event);
        let mut in_flight = self.in_flight();
        while in_flight.try_join_next().is_some() {}

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let event = Arc::clone(&event);
            in_flight.spawn(async move {
                if let Err(e) = channel.send(&event).await {
                    error!(
                        channel = channel.name(),
                        topic = %event.topic(),
                        error = %e,
                        "Failed to send event"
                    );
                } else {
                    debug!(channel = channel.name(), topic = %event.topic(), "Event sent");
                }
            });
        }
    }

    /// Wait for every queued delivery to finish. Returns how many were awaited.
    pub async fn flush(&self) -> usize {
        let mut pending = std::mem::take(&mut *self.in_flight());
        let mut awaited = 0;
        while let Some(joined) = pending.join_next().await {
            awaited += 1;
            if let Err(e) = joined {
                warn!(error = %e, "Event delivery task did not complete");
            }
        }
        if awaited > 0 {
            debug!(awaited, "Event deliveries flushed");
        }
        awaited
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::from_env()
    }
}
