//! Event collaborator seam.

use notify::{ChannelError, Notifier, ProvisionEvent};

/// Publishes lifecycle events. Callers treat failures as non-fatal.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    ///
    /// # Errors
    /// Returns the delivery error, if the sink reports one synchronously.
    fn publish(&self, event: ProvisionEvent) -> Result<(), ChannelError>;
}

impl EventSink for Notifier {
    fn publish(&self, event: ProvisionEvent) -> Result<(), ChannelError> {
        self.notify(event);
        Ok(())
    }
}
