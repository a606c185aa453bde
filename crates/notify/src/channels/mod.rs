//! Event delivery channels.

pub mod webhook;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::events::ProvisionEvent;

/// Trait for event delivery channels.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Deliver one event.
    async fn send(&self, event: &ProvisionEvent) -> Result<(), ChannelError>;
}
