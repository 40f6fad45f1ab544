//! Bridge configuration.

use std::time::Duration;

use crate::map::FreqPolicy;

/// Options for connecting to and driving a unit.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Explicit BLE address; `None` scans and takes the first advertiser.
    pub device_address: Option<String>,
    /// How long discovery listens for advertisements.
    pub scan_timeout: Duration,
    /// Ceiling of the legacy strength scale exposed to callers.
    pub strength_limit: u16,
    /// Custom-mode frequency derivation for queued waveform frames.
    pub freq_policy: FreqPolicy,
    /// How long queries wait for a matching reply.
    pub query_timeout: Duration,
    /// Reject reply frames with bad checksums instead of merely counting
    /// them. Off by default; deployed units routinely miscompute the sum
    /// on pushed status frames.
    pub verify_replies: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_address: None,
            scan_timeout: Duration::from_secs(10),
            strength_limit: 200,
            freq_policy: FreqPolicy::default(),
            query_timeout: Duration::from_secs(1),
            verify_replies: false,
        }
    }
}
