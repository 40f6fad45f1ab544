//! Device discovery.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};

use crate::error::Error;
use crate::transport::SERVICE_UUID;

/// One unit seen during a scan.
#[derive(Debug, Clone)]
pub struct Discovered {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

impl std::fmt::Display for Discovered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

async fn default_adapter() -> Result<Adapter, Error> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::ConnectFailed("no bluetooth adapter".into()))
}

async fn scan_peripherals(adapter: &Adapter, timeout: Duration) -> Result<Vec<Peripheral>, Error> {
    adapter
        .start_scan(ScanFilter {
            services: vec![SERVICE_UUID],
        })
        .await?;
    tokio::time::sleep(timeout).await;
    let peripherals = adapter.peripherals().await?;
    if let Err(e) = adapter.stop_scan().await {
        log::debug!("stop_scan: {e}");
    }
    Ok(peripherals)
}

/// Scan for units advertising the control service.
pub async fn scan(timeout: Duration) -> Result<Vec<Discovered>, Error> {
    let adapter = default_adapter().await?;
    let mut found = Vec::new();
    for peripheral in scan_peripherals(&adapter, timeout).await? {
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        if !props.services.contains(&SERVICE_UUID) {
            continue;
        }
        found.push(Discovered {
            address: peripheral.address().to_string(),
            name: props.local_name,
            rssi: props.rssi,
        });
    }
    log::info!("scan finished, {} unit(s) in range", found.len());
    Ok(found)
}

/// Locate the peripheral to drive: the one with the requested address if
/// given, else the first advertiser of the control service.
pub(crate) async fn find_peripheral(
    address: Option<&str>,
    timeout: Duration,
) -> Result<Peripheral, Error> {
    let adapter = default_adapter().await?;
    for peripheral in scan_peripherals(&adapter, timeout).await? {
        match address {
            Some(wanted) => {
                if peripheral
                    .address()
                    .to_string()
                    .eq_ignore_ascii_case(wanted)
                {
                    return Ok(peripheral);
                }
            }
            None => {
                let Some(props) = peripheral.properties().await? else {
                    continue;
                };
                if props.services.contains(&SERVICE_UUID) {
                    return Ok(peripheral);
                }
            }
        }
    }
    Err(Error::DeviceNotFound)
}
