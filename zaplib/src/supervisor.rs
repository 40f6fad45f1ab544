//! Runs the bridge on a dedicated worker thread with its own runtime.
//!
//! Some hosts own an event loop that cannot share a thread with the BLE
//! driver (GUI-integrated loops, mostly). The [Supervisor] keeps all BLE
//! I/O, both waveform players and the notify consumer on one worker thread
//! carrying a current-thread tokio runtime, and exposes a thread-safe
//! submit interface: high-rate commands (strength drags, waveform batches)
//! go out fire-and-forget, queries and `stop_all` block the caller on a
//! reply channel.

use std::future::Future;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bridge::{Bridge, StreamUpdate};
use crate::config::BridgeConfig;
use crate::error::Error;
use crate::map::PulseOp;
use crate::protocol::{
    ChannelStatus, DeviceFault, ElectrodeStatus, ImuSample, MotorState, StepOp,
};
use crate::state::{Channel, SharedState, StrengthData, StrengthOp};
use crate::transport::{LinkStatus, Transport};

/// Margin on top of the scan timeout before giving up on the ready latch.
const READY_MARGIN: Duration = Duration::from_secs(15);

/// Bound on host-side waits for worker replies.
const AWAIT_TIMEOUT: Duration = Duration::from_secs(5);

enum Job {
    SetStrength {
        channel: Channel,
        op: StrengthOp,
        value: u16,
    },
    AddPulses {
        channel: Channel,
        pulses: Vec<PulseOp>,
    },
    ClearPulses {
        channel: Channel,
    },
    SetPreset {
        channel: Channel,
        index: u8,
    },
    SetCustomWave {
        channel: Channel,
        frequency: u8,
        pulse_width: u8,
    },
    SetMotor {
        state: MotorState,
    },
    SetStepTracking {
        op: StepOp,
    },
    SetAngleReporting {
        enabled: bool,
    },
    StopAll {
        reply: SyncSender<Result<bool, Error>>,
    },
    Battery {
        reply: SyncSender<Result<i16, Error>>,
    },
    ElectrodeStatus {
        channel: Channel,
        reply: SyncSender<Result<ElectrodeStatus, Error>>,
    },
    ChannelStatus {
        channel: Channel,
        reply: SyncSender<Result<Option<ChannelStatus>, Error>>,
    },
    MotorStatus {
        reply: SyncSender<Result<Option<MotorState>, Error>>,
    },
    StepCount {
        reply: SyncSender<Result<Option<u16>, Error>>,
    },
    Imu {
        reply: SyncSender<Result<Option<ImuSample>, Error>>,
    },
    Fault {
        reply: SyncSender<Result<Option<DeviceFault>, Error>>,
    },
    RecvData {
        timeout: Duration,
        reply: SyncSender<Result<StrengthData, Error>>,
    },
    Disconnect {
        reply: SyncSender<()>,
    },
    Shutdown {
        reply: SyncSender<()>,
    },
}

struct Ready {
    shared: Arc<SharedState>,
    link: LinkStatus,
    client_id: Uuid,
    target_id: Uuid,
}

/// Host-side handle to the worker. See the module docs.
pub struct Supervisor {
    jobs: mpsc::UnboundedSender<Job>,
    shared: Arc<SharedState>,
    link: LinkStatus,
    client_id: Uuid,
    target_id: Uuid,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Supervisor {
    /// Spawn the worker, let it discover and connect, and wait for it to
    /// come up (bounded by scan timeout plus a fixed margin).
    pub fn start(config: BridgeConfig) -> Result<Self, Error> {
        Self::start_with(config, |cfg| crate::bridge::connect(cfg))
    }

    /// Same, with a pluggable connector.
    pub(crate) fn start_with<T, F, Fut>(config: BridgeConfig, connector: F) -> Result<Self, Error>
    where
        T: Transport,
        F: FnOnce(BridgeConfig) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bridge<T>, Error>> + 'static,
    {
        let ready_wait = config.scan_timeout + READY_MARGIN;
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        // the worker holds its own sender clone: dropping every host-side
        // handle must NOT stop a live session, only Shutdown does
        let worker_tx = job_tx.clone();
        let thread = std::thread::Builder::new()
            .name("zap-bridge".into())
            .spawn(move || worker(config, connector, job_rx, worker_tx, ready_tx))
            .map_err(|e| Error::ConnectFailed(format!("worker thread: {e}")))?;

        match ready_rx.recv_timeout(ready_wait) {
            Ok(Ok(ready)) => Ok(Self {
                jobs: job_tx,
                shared: ready.shared,
                link: ready.link,
                client_id: ready.client_id,
                target_id: ready.target_id,
                thread: Mutex::new(Some(thread)),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Deterministic consumer-side identifier (see [Bridge::client_id]).
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Deterministic device-side identifier (see [Bridge::target_id]).
    pub fn target_id(&self) -> Uuid {
        self.target_id
    }

    /// Live view of the GATT session.
    pub fn connected(&self) -> bool {
        self.link.up()
    }

    /// Copied snapshot of the cached strengths; never blocks on the worker.
    pub fn strength_data(&self) -> StrengthData {
        self.shared.strength_data()
    }

    fn submit(&self, job: Job) -> Result<bool, Error> {
        self.jobs.send(job).map_err(|_| Error::WorkerStopped)?;
        Ok(true)
    }

    fn submit_await<R>(
        &self,
        build: impl FnOnce(SyncSender<R>) -> Job,
        timeout: Duration,
    ) -> Result<R, Error> {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.submit(build(tx))?;
        rx.recv_timeout(timeout).map_err(|_| Error::Timeout)
    }

    /// Schedule a strength operation without waiting. `Ok(true)` means the
    /// command was queued, not that the device took it.
    pub fn set_strength(&self, channel: Channel, op: StrengthOp, value: u16) -> Result<bool, Error> {
        self.submit(Job::SetStrength { channel, op, value })
    }

    /// Replace the channel's queued waveform (clear, then enqueue, as one
    /// scheduled action). Overflow beyond the queue bound is dropped
    /// silently.
    pub fn add_pulses(&self, channel: Channel, pulses: Vec<PulseOp>) -> Result<bool, Error> {
        self.submit(Job::AddPulses { channel, pulses })
    }

    pub fn clear_pulses(&self, channel: Channel) -> Result<bool, Error> {
        self.submit(Job::ClearPulses { channel })
    }

    pub fn set_pulse_preset(&self, channel: Channel, index: u8) -> Result<bool, Error> {
        self.submit(Job::SetPreset { channel, index })
    }

    pub fn set_custom_wave(
        &self,
        channel: Channel,
        frequency: u8,
        pulse_width: u8,
    ) -> Result<bool, Error> {
        self.submit(Job::SetCustomWave {
            channel,
            frequency,
            pulse_width,
        })
    }

    pub fn set_motor(&self, state: MotorState) -> Result<bool, Error> {
        self.submit(Job::SetMotor { state })
    }

    /// Drive the step counter (on/off/clear/pause/resume).
    pub fn set_step_tracking(&self, op: StepOp) -> Result<bool, Error> {
        self.submit(Job::SetStepTracking { op })
    }

    /// Switch IMU reporting on or off.
    pub fn set_angle_reporting(&self, enabled: bool) -> Result<bool, Error> {
        self.submit(Job::SetAngleReporting { enabled })
    }

    /// Stop playback and disable both channels and the motor; waits for
    /// the worker to finish.
    pub fn stop_all(&self) -> Result<bool, Error> {
        self.submit_await(|reply| Job::StopAll { reply }, AWAIT_TIMEOUT)?
    }

    /// Battery charge in percent, -1 when the unit stays quiet.
    pub fn battery(&self) -> Result<i16, Error> {
        self.submit_await(|reply| Job::Battery { reply }, AWAIT_TIMEOUT)?
    }

    pub fn electrode_status(&self, channel: Channel) -> Result<ElectrodeStatus, Error> {
        self.submit_await(|reply| Job::ElectrodeStatus { channel, reply }, AWAIT_TIMEOUT)?
    }

    pub fn channel_status(&self, channel: Channel) -> Result<Option<ChannelStatus>, Error> {
        self.submit_await(|reply| Job::ChannelStatus { channel, reply }, AWAIT_TIMEOUT)?
    }

    /// Reported motor state, `None` on timeout.
    pub fn motor_status(&self) -> Result<Option<MotorState>, Error> {
        self.submit_await(|reply| Job::MotorStatus { reply }, AWAIT_TIMEOUT)?
    }

    /// Accumulated step count, `None` on timeout.
    pub fn step_count(&self) -> Result<Option<u16>, Error> {
        self.submit_await(|reply| Job::StepCount { reply }, AWAIT_TIMEOUT)?
    }

    /// One six-axis IMU reading, `None` on timeout.
    pub fn imu(&self) -> Result<Option<ImuSample>, Error> {
        self.submit_await(|reply| Job::Imu { reply }, AWAIT_TIMEOUT)?
    }

    /// Last fault the unit cares to report, `None` on timeout.
    pub fn fault(&self) -> Result<Option<DeviceFault>, Error> {
        self.submit_await(|reply| Job::Fault { reply }, AWAIT_TIMEOUT)?
    }

    /// Pump one notification on the worker and return the refreshed
    /// strength snapshot (see [Bridge::recv_data]).
    pub fn recv_data(&self, timeout: Duration) -> Result<StrengthData, Error> {
        self.submit_await(
            |reply| Job::RecvData { timeout, reply },
            timeout + AWAIT_TIMEOUT,
        )?
    }

    /// Close the GATT session without stopping the worker.
    ///
    /// The worker keeps serving (subsequent commands surface
    /// [Error::Disconnected]); [stop](Supervisor::stop) remains the full
    /// teardown.
    pub fn disconnect(&self) -> Result<(), Error> {
        self.submit_await(|reply| Job::Disconnect { reply }, AWAIT_TIMEOUT)
    }

    /// Strength snapshots at the given cadence, ending with a single
    /// [StreamUpdate::Disconnected] once the link drops.
    ///
    /// Runs entirely on the caller's runtime against the shared snapshot;
    /// the worker is never involved.
    pub fn strength_stream(&self, poll: Duration) -> impl futures::Stream<Item = StreamUpdate> + '_ {
        futures::stream::unfold(false, move |done| async move {
            if done {
                return None;
            }
            if !self.connected() {
                return Some((StreamUpdate::Disconnected, true));
            }
            tokio::time::sleep(poll).await;
            Some((StreamUpdate::Strength(self.strength_data()), false))
        })
    }

    /// Shut the worker down and close the session.
    ///
    /// This is the only way the worker stops: dropping the handle leaves
    /// the session running on purpose, because embedding loops have been
    /// seen firing teardown hooks spuriously mid-session.
    pub fn stop(&self) -> Result<(), Error> {
        let result = self.submit_await(|reply| Job::Shutdown { reply }, AWAIT_TIMEOUT);
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
        match result {
            Ok(()) => Ok(()),
            // already stopped: nothing left to do
            Err(Error::WorkerStopped) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn worker<T, F, Fut>(
    config: BridgeConfig,
    connector: F,
    jobs: mpsc::UnboundedReceiver<Job>,
    keepalive: mpsc::UnboundedSender<Job>,
    ready: SyncSender<Result<Ready, Error>>,
) where
    T: Transport,
    F: FnOnce(BridgeConfig) -> Fut,
    Fut: Future<Output = Result<Bridge<T>, Error>> + 'static,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready.send(Err(Error::ConnectFailed(format!("worker runtime: {e}"))));
            return;
        }
    };

    runtime.block_on(async move {
        let bridge = match connector(config).await {
            Ok(bridge) => bridge,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(Ready {
            shared: bridge.shared_state(),
            link: bridge.link_status(),
            client_id: bridge.client_id(),
            target_id: bridge.target_id(),
        }));
        log::info!("bridge worker up");
        serve(bridge, jobs, keepalive).await;
        log::info!("bridge worker down");
    });
}

async fn serve<T: Transport>(
    bridge: Bridge<T>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    keepalive: mpsc::UnboundedSender<Job>,
) {
    // fire-and-forget failures are logged and swallowed; the host cannot
    // do anything useful with them at this point anyway
    while let Some(job) = jobs.recv().await {
        match job {
            Job::SetStrength { channel, op, value } => {
                if let Err(e) = bridge.set_strength(channel, op, value).await {
                    log::warn!("set_strength({channel:?}): {e}");
                }
            }
            Job::AddPulses { channel, pulses } => {
                if let Err(e) = bridge.add_pulses(channel, &pulses).await {
                    log::warn!("add_pulses({channel:?}): {e}");
                }
            }
            Job::ClearPulses { channel } => {
                if let Err(e) = bridge.clear_pulses(channel).await {
                    log::warn!("clear_pulses({channel:?}): {e}");
                }
            }
            Job::SetPreset { channel, index } => {
                if let Err(e) = bridge.set_pulse_preset(channel, index).await {
                    log::warn!("set_pulse_preset({channel:?}): {e}");
                }
            }
            Job::SetCustomWave {
                channel,
                frequency,
                pulse_width,
            } => {
                if let Err(e) = bridge.set_custom_wave(channel, frequency, pulse_width).await {
                    log::warn!("set_custom_wave({channel:?}): {e}");
                }
            }
            Job::SetMotor { state } => {
                if let Err(e) = bridge.set_motor(state).await {
                    log::warn!("set_motor: {e}");
                }
            }
            Job::SetStepTracking { op } => {
                if let Err(e) = bridge.set_step_tracking(op).await {
                    log::warn!("set_step_tracking: {e}");
                }
            }
            Job::SetAngleReporting { enabled } => {
                if let Err(e) = bridge.set_angle_reporting(enabled).await {
                    log::warn!("set_angle_reporting: {e}");
                }
            }
            Job::StopAll { reply } => {
                let _ = reply.try_send(bridge.stop_all().await);
            }
            Job::Battery { reply } => {
                let _ = reply.try_send(bridge.battery().await);
            }
            Job::ElectrodeStatus { channel, reply } => {
                let _ = reply.try_send(bridge.electrode_status(channel).await);
            }
            Job::ChannelStatus { channel, reply } => {
                let _ = reply.try_send(bridge.channel_status(channel).await);
            }
            Job::MotorStatus { reply } => {
                let _ = reply.try_send(bridge.motor_status().await);
            }
            Job::StepCount { reply } => {
                let _ = reply.try_send(bridge.step_count().await);
            }
            Job::Imu { reply } => {
                let _ = reply.try_send(bridge.imu().await);
            }
            Job::Fault { reply } => {
                let _ = reply.try_send(bridge.fault().await);
            }
            Job::RecvData { timeout, reply } => {
                let _ = reply.try_send(bridge.recv_data(timeout).await);
            }
            Job::Disconnect { reply } => {
                bridge.disconnect().await;
                let _ = reply.try_send(());
            }
            Job::Shutdown { reply } => {
                bridge.disconnect().await;
                let _ = reply.try_send(());
                break;
            }
        }
    }
    drop(keepalive);
}
