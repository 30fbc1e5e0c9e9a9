use std::time::Duration;

use nlprims_frame::FrameConfig;

/// Family looked up by generic endpoints unless configured otherwise.
pub const DEFAULT_FAMILY_NAME: &str = "NFLUA";

/// How generic endpoints address and wrap their payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericConfig {
    /// Family name sent in the controller lookup.
    pub family_name: String,
    /// Generic command placed in every outgoing frame.
    pub command: u8,
    /// Generic version placed in every outgoing frame.
    pub version: u8,
    /// Attribute type carrying the payload.
    pub message_attribute: u16,
}

impl Default for GenericConfig {
    fn default() -> Self {
        Self {
            family_name: DEFAULT_FAMILY_NAME.to_string(),
            command: 1,
            version: 1,
            message_attribute: 1,
        }
    }
}

/// Configuration applied when an endpoint is opened.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointConfig {
    /// Payload ceiling; sizes both frame buffers.
    pub frame: FrameConfig,
    /// Per-call block timeout. `None` waits indefinitely.
    pub block_timeout: Option<Duration>,
    /// Total budget per operation. `None` is unbounded.
    pub total_timeout: Option<Duration>,
    pub generic: GenericConfig,
}

impl EndpointConfig {
    /// Set the payload ceiling. Opening an endpoint clamps it to the
    /// variant's frame format.
    pub fn with_max_payload(mut self, max_payload_size: usize) -> Self {
        self.frame.max_payload_size = max_payload_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn with_total_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.total_timeout = timeout;
        self
    }

    pub fn with_family_name(mut self, name: impl Into<String>) -> Self {
        self.generic.family_name = name.into();
        self
    }

    pub fn with_generic(mut self, generic: GenericConfig) -> Self {
        self.generic = generic;
        self
    }
}
