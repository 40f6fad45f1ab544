//! GATT transport to the unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Error;

/// Control service advertised by the unit.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ff30_0000_1000_8000_00805f9b34fb);
/// Command characteristic; written without response.
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff31_0000_1000_8000_00805f9b34fb);
/// Status characteristic; replies and pushed reports arrive here.
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff32_0000_1000_8000_00805f9b34fb);

/// Shared liveness flag for one GATT session.
///
/// The notify forwarder clears it when the peripheral goes away, which is
/// how host-side `connected` views learn about spontaneous disconnects.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus(Arc<AtomicBool>);

impl LinkStatus {
    pub fn up(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, up: bool) {
        self.0.store(up, Ordering::Release);
    }
}

/// The write/notify pair the bridge runs on.
///
/// Implementations queue every raw notification internally;
/// [next_notification](Transport::next_notification) hands them out one at
/// a time to the single consumer on the worker loop.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Stable identifier of the remote device (its BLE address).
    fn address(&self) -> &str;

    /// Liveness flag of this session; clones stay valid after the
    /// transport itself is out of reach.
    fn status(&self) -> &LinkStatus;

    /// Whether the GATT session is currently live.
    fn connected(&self) -> bool {
        self.status().up()
    }

    /// Write one frame without response.
    ///
    /// `Ok(false)` on a transport error (the frame may be lost), and
    /// [Error::Disconnected] when the link is already down.
    async fn write_frame(&self, frame: &[u8]) -> Result<bool, Error>;

    /// Pop one raw notification, `Ok(None)` on timeout,
    /// [Error::Disconnected] once the link drops.
    async fn next_notification(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error>;

    /// Best-effort close; idempotent.
    async fn disconnect(&self);
}

/// [Transport] over a btleplug peripheral.
pub struct BtleTransport {
    peripheral: Peripheral,
    address: String,
    status: LinkStatus,
    write_char: Characteristic,
    notify_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    forwarder: tokio::task::JoinHandle<()>,
}

impl BtleTransport {
    /// Connect, subscribe to status notifications, and wire the queue.
    pub async fn open(peripheral: Peripheral, status: LinkStatus) -> Result<Self, Error> {
        peripheral
            .connect()
            .await
            .map_err(|e| Error::ConnectFailed(e.to_string()))?;
        peripheral.discover_services().await?;

        let chars = peripheral.characteristics();
        let write_char = chars
            .iter()
            .find(|c| c.uuid == WRITE_CHAR_UUID)
            .cloned()
            .ok_or_else(|| Error::ConnectFailed("write characteristic missing".into()))?;
        let notify_char = chars
            .iter()
            .find(|c| c.uuid == NOTIFY_CHAR_UUID)
            .cloned()
            .ok_or_else(|| Error::ConnectFailed("notify characteristic missing".into()))?;

        peripheral.subscribe(&notify_char).await?;
        let mut notifications = peripheral.notifications().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let fwd_status = status.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(n) = notifications.next().await {
                if n.uuid != NOTIFY_CHAR_UUID {
                    continue;
                }
                if tx.send(n.value).is_err() {
                    break;
                }
            }
            // the stream only ends when the peripheral is gone
            fwd_status.set(false);
            log::info!("notify stream closed, link marked down");
        });

        let address = peripheral.address().to_string();
        status.set(true);
        log::info!("connected to {address}");

        Ok(Self {
            peripheral,
            address,
            status,
            write_char,
            notify_rx: tokio::sync::Mutex::new(rx),
            forwarder,
        })
    }
}

#[async_trait]
impl Transport for BtleTransport {
    fn address(&self) -> &str {
        &self.address
    }

    fn status(&self) -> &LinkStatus {
        &self.status
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<bool, Error> {
        if !self.status.up() {
            return Err(Error::Disconnected);
        }
        match self
            .peripheral
            .write(&self.write_char, frame, WriteType::WithoutResponse)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                log::warn!("frame write failed: {e}");
                Ok(false)
            }
        }
    }

    async fn next_notification(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
        if !self.status.up() {
            return Err(Error::Disconnected);
        }
        let mut rx = self.notify_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(frame)) => Ok(Some(frame)),
            // sender dropped with the forwarder: the link is gone
            Ok(None) => {
                self.status.set(false);
                Err(Error::Disconnected)
            }
        }
    }

    async fn disconnect(&self) {
        self.status.set(false);
        if let Err(e) = self.peripheral.disconnect().await {
            log::debug!("disconnect from {}: {e}", self.address);
        }
        self.forwarder.abort();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use parking_lot::Mutex;

    use super::*;

    /// In-memory [Transport] for facade, player and supervisor tests.
    ///
    /// Clones share the same write log, notify queue and status flag, so a
    /// test can keep one handle while the bridge owns another.
    #[derive(Clone)]
    pub(crate) struct MockTransport {
        status: LinkStatus,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        notify_tx: mpsc::UnboundedSender<Vec<u8>>,
        notify_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            let (notify_tx, notify_rx) = mpsc::unbounded_channel();
            let status = LinkStatus::default();
            status.set(true);
            Self {
                status,
                writes: Arc::new(Mutex::new(Vec::new())),
                notify_tx,
                notify_rx: Arc::new(tokio::sync::Mutex::new(notify_rx)),
                fail_writes: Arc::new(AtomicBool::new(false)),
            }
        }

        pub(crate) fn push_notification(&self, frame: Vec<u8>) {
            self.notify_tx.send(frame).unwrap();
        }

        pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().clone()
        }

        pub(crate) fn clear_writes(&self) {
            self.writes.lock().clear();
        }

        pub(crate) fn set_down(&self) {
            self.status.set(false);
        }

        pub(crate) fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn address(&self) -> &str {
            "aa:bb:cc:dd:ee:ff"
        }

        fn status(&self) -> &LinkStatus {
            &self.status
        }

        async fn write_frame(&self, frame: &[u8]) -> Result<bool, Error> {
            if !self.status.up() {
                return Err(Error::Disconnected);
            }
            if self.fail_writes.load(Ordering::Acquire) {
                return Ok(false);
            }
            self.writes.lock().push(frame.to_vec());
            Ok(true)
        }

        async fn next_notification(&self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
            if !self.status.up() {
                return Err(Error::Disconnected);
            }
            let mut rx = self.notify_rx.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Err(_) => Ok(None),
                Ok(frame) => Ok(frame),
            }
        }

        async fn disconnect(&self) {
            self.status.set(false);
        }
    }
}
