//! Client configuration.

use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Long-poll timeout sent with each `sync_streams` call.
    pub sync_timeout: Duration,
    /// Pause before retrying a failed sync call.
    pub retry_delay: Duration,
    /// Verify signatures of synced events before folding them.
    pub verify_events: bool,
    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(29),
            retry_delay: Duration::from_secs(1),
            verify_events: true,
            notification_capacity: 1024,
        }
    }
}
