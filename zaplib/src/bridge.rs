//! Legacy-API-shaped facade over the BLE transport.
//!
//! Mirrors the surface downstream consumers already program against
//! (strength operations, queued 100 ms waveform frames, a strength
//! snapshot stream) and adds the unit's native extras: battery, motor,
//! preset selection, electrode status, step counter and IMU queries.
//!
//! Every cache mutation funnels through here or the waveform players, so
//! the cache always matches what the next composed frame will assert.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::error::Error;
use crate::map::{preset_from_index, pulse_to_wave, PulseOp};
use crate::player::Player;
use crate::protocol::{
    parse_reply, ChannelStatus, Command, DeviceFault, ElectrodeStatus, ImuSample, Mode, MotorState,
    ParseResult, QueryKind, Reply, StepOp, SumIgnore, SumVerify, STRENGTH_MAX,
};
use crate::scanner;
use crate::state::{Channel, SharedState, StrengthData, StrengthOp};
use crate::transport::{BtleTransport, LinkStatus, Transport};

/// Log every Nth checksum mismatch seen on the reply path.
const SUM_MISS_LOG_EVERY: u64 = 16;

/// One item of [Bridge::strength_stream].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamUpdate {
    Strength(StrengthData),
    /// The transport reported a disconnect; the stream ends after this.
    Disconnected,
}

/// Transport-facing internals shared between the facade and the players.
pub(crate) struct Core<T: Transport> {
    transport: T,
    shared: Arc<SharedState>,
    config: BridgeConfig,
    // queries are single-outstanding: the wire has no sequence numbers,
    // so correlation is by reply kind and must not interleave
    query_lock: tokio::sync::Mutex<()>,
    sum_misses: AtomicU64,
}

impl<T: Transport> Core<T> {
    pub(crate) fn new(transport: T, shared: Arc<SharedState>, config: BridgeConfig) -> Self {
        Self {
            transport,
            shared,
            config,
            query_lock: tokio::sync::Mutex::new(()),
            sum_misses: AtomicU64::new(0),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub(crate) async fn send(&self, command: &Command) -> Result<bool, Error> {
        self.transport.write_frame(&command.encode()).await
    }

    /// Custom-wave emission used by the players and `set_custom_wave`.
    ///
    /// Disabled or idle channels succeed without emitting, so waveform data
    /// queued before the user raises strength is consumed quietly instead
    /// of erroring. A real emission records custom mode and the pair in
    /// the cache for later reassertion.
    pub(crate) async fn emit_custom_wave(
        &self,
        channel: Channel,
        frequency: u8,
        pulse_width: u8,
    ) -> Result<bool, Error> {
        let frame = self.shared.with_channel(channel, |st| {
            if !st.enabled || st.strength <= 1 {
                return None;
            }
            st.mode = Mode::Custom;
            st.wave = (frequency, pulse_width);
            Some(st.control_frame(channel))
        });
        match frame {
            None => Ok(true),
            Some(frame) => self.send(&frame).await,
        }
    }

    /// Parse one notification under the configured verification policy.
    ///
    /// Mismatched sums are always counted and sampled into the log; they
    /// only become errors when `verify_replies` is set.
    fn parse_frame(&self, data: &[u8]) -> ParseResult {
        match parse_reply(&SumVerify, data) {
            ParseResult::SumErr { expected, actual } => {
                let n = self.sum_misses.fetch_add(1, Ordering::Relaxed) + 1;
                if n % SUM_MISS_LOG_EVERY == 1 {
                    log::warn!(
                        "checksum mismatch #{n} (expected {expected:#04x}, got {actual:#04x})"
                    );
                }
                if self.config.verify_replies {
                    ParseResult::SumErr { expected, actual }
                } else {
                    parse_reply(&SumIgnore, data)
                }
            }
            result => result,
        }
    }

    /// Fold a reply's channel status back into the cache.
    fn absorb(&self, reply: &Reply) {
        let (channel, status) = match reply {
            Reply::ChannelA(status) => (Channel::A, status),
            Reply::ChannelB(status) => (Channel::B, status),
            _ => return,
        };
        self.shared.with_channel(channel, |st| {
            st.strength = status.strength.clamp(1, STRENGTH_MAX);
            st.enabled = status.enabled;
        });
    }

    /// Issue one query and wait for the matching reply kind.
    ///
    /// Unrelated frames arriving in the meantime (status pushes for the
    /// strength stream, mostly) are absorbed and skipped. `Ok(None)` when
    /// the device stays quiet past the configured timeout.
    pub(crate) async fn query(&self, kind: QueryKind) -> Result<Option<Reply>, Error> {
        let _guard = self.query_lock.lock().await;
        if !self.send(&Command::Query(kind)).await? {
            return Ok(None);
        }
        let deadline = tokio::time::Instant::now() + self.config.query_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.transport.next_notification(remaining).await? {
                None => return Ok(None),
                Some(data) => match self.parse_frame(&data) {
                    ParseResult::Ok(reply) => {
                        self.absorb(&reply);
                        if reply.kind() == kind {
                            return Ok(Some(reply));
                        }
                    }
                    ParseResult::SumErr { expected, actual } => {
                        return Err(Error::ChecksumMismatch { expected, actual });
                    }
                    ParseResult::Incomplete | ParseResult::None => {}
                },
            }
        }
    }
}

/// The bridge facade. See the crate docs for the overall shape.
pub struct Bridge<T: Transport> {
    core: Arc<Core<T>>,
    players: [Player; 2],
    client_id: Uuid,
    target_id: Uuid,
}

/// Scan (when no address is configured), connect, and build a bridge over
/// the live link.
pub async fn connect(config: BridgeConfig) -> Result<Bridge<BtleTransport>, Error> {
    let peripheral =
        scanner::find_peripheral(config.device_address.as_deref(), config.scan_timeout).await?;
    let transport = BtleTransport::open(peripheral, LinkStatus::default()).await?;
    Ok(Bridge::new(transport, config))
}

impl<T: Transport> Bridge<T> {
    /// Wrap an already-connected transport.
    pub fn new(transport: T, config: BridgeConfig) -> Self {
        let address = transport.address();
        let client_id = Uuid::new_v5(
            &Uuid::NAMESPACE_DNS,
            format!("zap-client-{address}").as_bytes(),
        );
        let target_id = Uuid::new_v5(
            &Uuid::NAMESPACE_DNS,
            format!("zap-device-{address}").as_bytes(),
        );
        let shared = Arc::new(SharedState::new(config.strength_limit));
        Self {
            core: Arc::new(Core::new(transport, shared, config)),
            players: [Player::new(Channel::A), Player::new(Channel::B)],
            client_id,
            target_id,
        }
    }

    fn player(&self, channel: Channel) -> &Player {
        &self.players[channel.index()]
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.connected() {
            Ok(())
        } else {
            Err(Error::Disconnected)
        }
    }

    /// Deterministic consumer-side identifier, derived from the address.
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Deterministic device-side identifier, derived from the address.
    pub fn target_id(&self) -> Uuid {
        self.target_id
    }

    pub fn connected(&self) -> bool {
        self.core.transport.connected()
    }

    /// Liveness flag, cloneable for host-side views.
    pub fn link_status(&self) -> LinkStatus {
        self.core.transport.status().clone()
    }

    /// Cache snapshot shared with host-side handles.
    pub fn shared_state(&self) -> Arc<SharedState> {
        Arc::clone(self.core.shared())
    }

    /// Current per-channel legacy strengths and the configured ceiling.
    pub fn strength_data(&self) -> StrengthData {
        self.core.shared.strength_data()
    }

    /// Apply a legacy strength operation and push the channel's full state.
    ///
    /// The cached mode rides along unchanged, so dragging strength around
    /// never loses the selected waveform.
    pub async fn set_strength(
        &self,
        channel: Channel,
        op: StrengthOp,
        value: u16,
    ) -> Result<bool, Error> {
        self.ensure_connected()?;
        let limit = self.core.shared.limit();
        let frame = self.core.shared.with_channel(channel, |st| {
            st.apply_strength_op(op, value, limit);
            st.control_frame(channel)
        });
        self.core.send(&frame).await
    }

    /// Replace the channel's queued waveform with `pulses`.
    ///
    /// The pending queue is dropped first so the new pattern starts on the
    /// next 100 ms tick; anything beyond the queue bound is discarded
    /// silently (freshness over completeness).
    pub async fn add_pulses(&self, channel: Channel, pulses: &[PulseOp]) -> Result<bool, Error> {
        self.ensure_connected()?;
        let policy = self.core.config.freq_policy;
        let player = self.player(channel);
        player.clear();
        player.add(
            &self.core,
            pulses.iter().map(|p| pulse_to_wave(policy, p)),
        );
        Ok(true)
    }

    /// Drop the channel's queued waveform.
    pub async fn clear_pulses(&self, channel: Channel) -> Result<bool, Error> {
        self.ensure_connected()?;
        self.player(channel).clear();
        Ok(true)
    }

    /// Select one of the 16 built-in programs by legacy catalog index.
    ///
    /// The cache always learns the new mode; a frame goes out only when the
    /// channel is live, otherwise the mode waits for the next enable.
    pub async fn set_pulse_preset(&self, channel: Channel, index: u8) -> Result<bool, Error> {
        self.ensure_connected()?;
        let frame = self.core.shared.with_channel(channel, |st| {
            st.mode = Mode::Preset(preset_from_index(index));
            (st.enabled && st.strength > 1).then(|| st.control_frame(channel))
        });
        match frame {
            Some(frame) => self.core.send(&frame).await,
            None => Ok(true),
        }
    }

    /// Drive the channel's custom mode directly.
    pub async fn set_custom_wave(
        &self,
        channel: Channel,
        frequency: u8,
        pulse_width: u8,
    ) -> Result<bool, Error> {
        self.ensure_connected()?;
        self.core.emit_custom_wave(channel, frequency, pulse_width).await
    }

    /// Stop playback and drive both channels and the motor to off.
    ///
    /// Serialized: A is disabled before B, the motor last. Transport
    /// failures surface (unlike the fire-and-forget paths).
    pub async fn stop_all(&self) -> Result<bool, Error> {
        let mut all_ok = true;
        for channel in [Channel::A, Channel::B] {
            let player = self.player(channel);
            player.stop().await;
            player.clear();
            let frame = self.core.shared.with_channel(channel, |st| st.stop(channel));
            all_ok &= self.core.send(&frame).await?;
        }
        all_ok &= self.core.send(&Command::MotorControl(MotorState::Off)).await?;
        Ok(all_ok)
    }

    /// Stop playback and close the GATT session. Idempotent.
    pub async fn disconnect(&self) {
        for player in &self.players {
            player.stop().await;
            player.clear();
        }
        self.core.transport.disconnect().await;
    }

    /// Pump one notification and return the current strength snapshot.
    ///
    /// Unsolicited channel-status frames refresh the cache; everything
    /// else is left alone for the query path.
    pub async fn recv_data(&self, timeout: Duration) -> Result<StrengthData, Error> {
        self.ensure_connected()?;
        if let Some(data) = self.core.transport.next_notification(timeout).await? {
            if let ParseResult::Ok(reply) = self.core.parse_frame(&data) {
                self.core.absorb(&reply);
            }
        }
        Ok(self.strength_data())
    }

    /// Endless sequence of strength snapshots, one per `poll`, ending with
    /// a single [StreamUpdate::Disconnected] once the link drops.
    pub fn strength_stream(&self, poll: Duration) -> impl Stream<Item = StreamUpdate> + '_ {
        futures::stream::unfold(false, move |done| async move {
            if done {
                return None;
            }
            if !self.connected() {
                return Some((StreamUpdate::Disconnected, true));
            }
            let tick = tokio::time::Instant::now();
            match self.recv_data(poll).await {
                Ok(_) => {
                    tokio::time::sleep_until(tick + poll).await;
                    Some((StreamUpdate::Strength(self.strength_data()), false))
                }
                Err(_) => Some((StreamUpdate::Disconnected, true)),
            }
        })
    }

    /// Battery charge in percent, or -1 when the unit stays quiet.
    pub async fn battery(&self) -> Result<i16, Error> {
        self.ensure_connected()?;
        match self.core.query(QueryKind::Battery).await? {
            Some(Reply::Battery(pct)) => Ok(i16::from(pct)),
            _ => Ok(-1),
        }
    }

    /// Electrode state of one channel; not-connected when the unit stays
    /// quiet.
    pub async fn electrode_status(&self, channel: Channel) -> Result<ElectrodeStatus, Error> {
        Ok(self
            .channel_status(channel)
            .await?
            .map(|status| status.electrode)
            .unwrap_or(ElectrodeStatus::NotConnected))
    }

    /// Full reported status of one channel, `None` on timeout.
    pub async fn channel_status(&self, channel: Channel) -> Result<Option<ChannelStatus>, Error> {
        self.ensure_connected()?;
        let kind = match channel {
            Channel::A => QueryKind::ChannelA,
            Channel::B => QueryKind::ChannelB,
        };
        Ok(self
            .core
            .query(kind)
            .await?
            .and_then(|reply| reply.channel_status()))
    }

    pub async fn set_motor(&self, state: MotorState) -> Result<bool, Error> {
        self.ensure_connected()?;
        self.core.send(&Command::MotorControl(state)).await
    }

    /// Reported motor state, `None` on timeout.
    pub async fn motor_status(&self) -> Result<Option<MotorState>, Error> {
        self.ensure_connected()?;
        Ok(match self.core.query(QueryKind::Motor).await? {
            Some(Reply::Motor(state)) => Some(state),
            _ => None,
        })
    }

    /// Drive the step counter (on/off/clear/pause/resume).
    pub async fn set_step_tracking(&self, op: StepOp) -> Result<bool, Error> {
        self.ensure_connected()?;
        self.core.send(&Command::StepControl(op)).await
    }

    /// Accumulated step count, `None` on timeout.
    pub async fn step_count(&self) -> Result<Option<u16>, Error> {
        self.ensure_connected()?;
        Ok(match self.core.query(QueryKind::StepCount).await? {
            Some(Reply::StepCount(n)) => Some(n),
            _ => None,
        })
    }

    /// Switch IMU reporting on or off.
    pub async fn set_angle_reporting(&self, enabled: bool) -> Result<bool, Error> {
        self.ensure_connected()?;
        self.core.send(&Command::AngleControl { enabled }).await
    }

    /// One six-axis IMU reading, `None` on timeout.
    pub async fn imu(&self) -> Result<Option<ImuSample>, Error> {
        self.ensure_connected()?;
        Ok(match self.core.query(QueryKind::Angle).await? {
            Some(Reply::Imu(sample)) => Some(sample),
            _ => None,
        })
    }

    /// Last fault the unit cares to report, `None` on timeout.
    pub async fn fault(&self) -> Result<Option<DeviceFault>, Error> {
        self.ensure_connected()?;
        Ok(match self.core.query(QueryKind::Fault).await? {
            Some(Reply::Fault(fault)) => Some(fault),
            _ => None,
        })
    }
}
