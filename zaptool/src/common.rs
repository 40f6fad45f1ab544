use std::time::Duration;

use zaplib::transport::BtleTransport;
use zaplib::{Bridge, BridgeConfig, Channel, FreqPolicy};

#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// BLE address of the unit; scans for the first one when omitted.
    #[arg(short, long)]
    pub address: Option<String>,
    /// Scan timeout in seconds.
    #[arg(long, default_value_t = 10)]
    pub scan_timeout: u64,
    /// Legacy strength ceiling (0-200).
    #[arg(long, default_value_t = 200)]
    pub limit: u16,
    /// Reject reply frames with bad checksums instead of counting them.
    #[arg(long)]
    pub verify: bool,
    /// Derive custom-wave frequency by averaging the legacy codes instead
    /// of driving at a fixed 100 Hz.
    #[arg(long)]
    pub average_freq: bool,
}

impl DeviceArgs {
    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            device_address: self.address.clone(),
            scan_timeout: Duration::from_secs(self.scan_timeout),
            strength_limit: self.limit,
            freq_policy: if self.average_freq {
                FreqPolicy::AverageClamped
            } else {
                FreqPolicy::Fixed100
            },
            ..BridgeConfig::default()
        }
    }

    pub async fn connect(&self) -> anyhow::Result<Bridge<BtleTransport>> {
        let bridge = zaplib::connect(self.config()).await?;
        log::info!("bridge ready (client {})", bridge.client_id());
        Ok(bridge)
    }
}

/// Channel selector on the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum ChannelArg {
    A,
    B,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::A => Channel::A,
            ChannelArg::B => Channel::B,
        }
    }
}
