//! Per-channel waveform playback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::bridge::Core;
use crate::state::Channel;
use crate::transport::Transport;

/// Frames held at most; beyond this the newest are dropped on the floor.
/// Freshness beats completeness under waveform backpressure.
pub(crate) const QUEUE_CAPACITY: usize = 500;

/// Playback cadence. One queued pair covers 100 ms of waveform.
pub(crate) const FRAME_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct PlayQueue {
    frames: Mutex<VecDeque<(u8, u8)>>,
    ready: Notify,
}

impl PlayQueue {
    /// Push one pair; silently refuses when full.
    fn push(&self, wave: (u8, u8)) -> bool {
        let mut frames = self.frames.lock();
        if frames.len() >= QUEUE_CAPACITY {
            return false;
        }
        frames.push_back(wave);
        drop(frames);
        self.ready.notify_one();
        true
    }

    fn pop(&self) -> Option<(u8, u8)> {
        self.frames.lock().pop_front()
    }

    fn clear(&self) {
        self.frames.lock().clear();
    }

    /// Pop the next pair, waiting up to `bound` for one to show up.
    async fn pop_wait(&self, bound: Duration) -> Option<(u8, u8)> {
        if let Some(wave) = self.pop() {
            return Some(wave);
        }
        tokio::time::timeout(bound, self.ready.notified()).await.ok()?;
        self.pop()
    }
}

/// Bounded waveform queue plus its 10 Hz playback task.
///
/// The task idles (rather than exits) on an empty queue, swallows transport
/// hiccups, and only stops on [stop](Player::stop). One player exists per
/// channel; both live on the worker loop.
pub(crate) struct Player {
    channel: Channel,
    queue: Arc<PlayQueue>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub(crate) fn new(channel: Channel) -> Self {
        Self {
            channel,
            queue: Arc::new(PlayQueue::default()),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Enqueue converted pairs and make sure playback is running.
    pub(crate) fn add<T, I>(&self, core: &Arc<Core<T>>, waves: I)
    where
        T: Transport,
        I: IntoIterator<Item = (u8, u8)>,
    {
        let mut dropped = 0usize;
        for wave in waves {
            if !self.queue.push(wave) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::debug!("{:?}: waveform queue full, dropped {dropped} frame(s)", self.channel);
        }
        self.start(core);
    }

    pub(crate) fn clear(&self) {
        self.queue.clear();
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.queue.frames.lock().len()
    }

    /// Spawn the playback task if it is not already running.
    pub(crate) fn start<T>(&self, core: &Arc<Core<T>>)
    where
        T: Transport,
    {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = tokio::spawn(playback(
            Arc::clone(core),
            self.channel,
            Arc::clone(&self.queue),
            Arc::clone(&self.running),
        ));
        *self.task.lock() = Some(handle);
    }

    /// Ask the task to wind down and wait for it.
    pub(crate) async fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.queue.ready.notify_one();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::warn!("{:?}: playback task failed: {e}", self.channel);
                }
            }
        }
    }
}

async fn playback<T>(
    core: Arc<Core<T>>,
    channel: Channel,
    queue: Arc<PlayQueue>,
    running: Arc<AtomicBool>,
) where
    T: Transport,
{
    log::debug!("{channel:?}: playback task up");
    while running.load(Ordering::Acquire) {
        let Some((frequency, pulse_width)) = queue.pop_wait(FRAME_INTERVAL).await else {
            continue;
        };
        // a dropped link or a lost write must not kill playback; the
        // emit path also no-ops harmlessly while the channel is idle
        if let Err(e) = core.emit_custom_wave(channel, frequency, pulse_width).await {
            log::debug!("{channel:?}: waveform emit failed: {e}");
        }
        tokio::time::sleep(FRAME_INTERVAL).await;
    }
    log::debug!("{channel:?}: playback task down");
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::bridge::Core;
    use crate::config::BridgeConfig;
    use crate::state::{SharedState, StrengthOp};
    use crate::transport::mock::MockTransport;

    fn core_with_mock() -> (Arc<Core<MockTransport>>, MockTransport) {
        let mock = MockTransport::new();
        let shared = Arc::new(SharedState::new(200));
        let core = Arc::new(Core::new(mock.clone(), shared, BridgeConfig::default()));
        (core, mock)
    }

    fn enable(core: &Arc<Core<MockTransport>>, channel: Channel) {
        core.shared()
            .with_channel(channel, |st| st.apply_strength_op(StrengthOp::Set, 100, 200));
    }

    #[tokio::test(start_paused = true)]
    async fn plays_at_one_frame_per_interval() {
        let (core, mock) = core_with_mock();
        enable(&core, Channel::A);

        let player = Player::new(Channel::A);
        player.add(&core, [(100, 10), (100, 20), (100, 30), (100, 40)]);
        tokio::time::sleep(Duration::from_millis(350)).await;
        let writes = mock.writes();
        // at most one emission per 100 ms tick
        assert!((3..=4).contains(&writes.len()), "got {} writes", writes.len());
        // insertion order: pulse-width bytes climb
        assert_eq!(writes[0][8], 10);
        assert_eq!(writes[1][8], 20);

        player.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_channel_consumes_without_writing() {
        let (core, mock) = core_with_mock();

        let player = Player::new(Channel::A);
        player.add(&core, [(100, 10), (100, 20)]);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(mock.writes().is_empty());
        assert_eq!(player.queued(), 0);

        player.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_drops_newest() {
        let (core, _mock) = core_with_mock();

        let player = Player::new(Channel::B);
        player.add(&core, std::iter::repeat((100, 50)).take(QUEUE_CAPACITY + 37));
        assert!(player.queued() <= QUEUE_CAPACITY);

        player.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drains_queue() {
        let (core, mock) = core_with_mock();
        enable(&core, Channel::A);

        let player = Player::new(Channel::A);
        player.add(&core, std::iter::repeat((100, 50)).take(20));
        player.clear();
        assert_eq!(player.queued(), 0);
        mock.clear_writes();
        tokio::time::sleep(Duration::from_millis(300)).await;
        // nothing left to play; the task idles instead of exiting
        assert!(mock.writes().len() <= 1);

        player.add(&core, [(100, 60)]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(mock.writes().iter().any(|w| w[8] == 60));

        player.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_prompt_and_restartable() {
        let (core, mock) = core_with_mock();
        enable(&core, Channel::A);

        let player = Player::new(Channel::A);
        player.add(&core, std::iter::repeat((100, 50)).take(50));
        tokio::time::sleep(Duration::from_millis(150)).await;
        player.stop().await;
        player.clear();

        mock.clear_writes();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(mock.writes().is_empty());

        // add() restarts a stopped player
        player.add(&core, [(100, 70)]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(mock.writes().iter().any(|w| w[8] == 70));

        player.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn write_errors_do_not_kill_playback() {
        let (core, mock) = core_with_mock();
        enable(&core, Channel::A);
        mock.fail_writes(true);

        let player = Player::new(Channel::A);
        player.add(&core, [(100, 10), (100, 20), (100, 30)]);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(mock.writes().is_empty());

        // the task is still alive and picks up new frames once writes recover
        mock.fail_writes(false);
        player.add(&core, [(100, 40)]);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(mock.writes().iter().any(|w| w[8] == 40));

        player.stop().await;
    }
}
