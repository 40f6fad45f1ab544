//! Cached per-channel state and frame composition.

use parking_lot::Mutex;

use crate::map::{strength_to_device, strength_to_legacy};
use crate::protocol::{ChannelSel, Command, Mode, Preset};

/// Legacy-facing channel selector. The broadcast selector exists only on
/// the wire; callers address channels individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    pub(crate) fn sel(self) -> ChannelSel {
        match self {
            Channel::A => ChannelSel::A,
            Channel::B => ChannelSel::B,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Channel::A => 0,
            Channel::B => 1,
        }
    }
}

/// Strength operations of the legacy control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrengthOp {
    Set,
    Increase,
    Decrease,
}

/// Snapshot of both channels in legacy units, plus the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrengthData {
    pub a: u16,
    pub b: u16,
    pub a_limit: u16,
    pub b_limit: u16,
}

/// Last-commanded state of one output channel.
///
/// The unit has no strength-only or mode-only command; every channel write
/// re-specifies the whole tuple. This cache is what the bridge will assert
/// on the next write, not a claim about what the hardware is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    /// Device scale, 1-276.
    pub strength: u16,
    pub enabled: bool,
    pub mode: Mode,
    /// Last custom-mode (frequency, pulse width), reasserted when a
    /// strength edit lands while custom mode is selected.
    pub wave: (u8, u8),
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            strength: 1,
            enabled: false,
            mode: Mode::Preset(Preset::P1),
            wave: (50, 50),
        }
    }
}

impl ChannelState {
    /// Strength as the legacy API sees it: 0 while disabled.
    pub fn legacy_strength(&self) -> u16 {
        if self.enabled {
            strength_to_legacy(self.strength)
        } else {
            0
        }
    }

    /// Apply a legacy strength operation, clamped to `0..=limit`.
    /// The selected mode is untouched: a strength edit must not lose the
    /// waveform the user picked.
    pub fn apply_strength_op(&mut self, op: StrengthOp, value: u16, limit: u16) {
        let current = self.legacy_strength();
        let next = match op {
            StrengthOp::Set => value,
            StrengthOp::Increase => current.saturating_add(value),
            StrengthOp::Decrease => current.saturating_sub(value),
        };
        let (enabled, strength) = strength_to_device(next.min(limit));
        self.enabled = enabled;
        self.strength = strength;
    }

    /// Full reassertion frame for this channel.
    ///
    /// A disabled channel always goes out in the canonical disable shape
    /// (preset 1, minimum strength); the off mode code is not valid on the
    /// wire, and keeping disable frames uniform sidesteps it entirely.
    pub fn control_frame(&self, channel: Channel) -> Command {
        if !self.enabled {
            return Self::disable_frame(channel);
        }
        let (frequency, pulse_width) = match self.mode {
            Mode::Custom => self.wave,
            Mode::Preset(_) => (0, 0),
        };
        Command::ChannelControl {
            channel: channel.sel(),
            enabled: true,
            strength: self.strength,
            mode: self.mode,
            frequency,
            pulse_width,
        }
    }

    /// Drop the channel into the canonical disable shape and return the
    /// frame asserting it. The selected mode survives in the cache so a
    /// later re-enable restores it.
    pub fn stop(&mut self, channel: Channel) -> Command {
        self.enabled = false;
        self.strength = 1;
        Self::disable_frame(channel)
    }

    fn disable_frame(channel: Channel) -> Command {
        Command::ChannelControl {
            channel: channel.sel(),
            enabled: false,
            strength: 1,
            mode: Mode::Preset(Preset::P1),
            frequency: 0,
            pulse_width: 0,
        }
    }
}

/// State shared between the bridge, its players, and host-side handles.
///
/// Channel caches are only ever mutated on the worker side; host-side
/// readers get copied snapshots.
#[derive(Debug)]
pub struct SharedState {
    channels: Mutex<[ChannelState; 2]>,
    limit: u16,
}

impl SharedState {
    pub fn new(limit: u16) -> Self {
        Self {
            channels: Mutex::new([ChannelState::default(); 2]),
            limit,
        }
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    /// Run `f` with exclusive access to one channel's cache.
    pub fn with_channel<R>(&self, channel: Channel, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        f(&mut self.channels.lock()[channel.index()])
    }

    /// Copied snapshot of both channels in legacy units.
    pub fn strength_data(&self) -> StrengthData {
        let channels = self.channels.lock();
        StrengthData {
            a: channels[0].legacy_strength(),
            b: channels[1].legacy_strength(),
            a_limit: self.limit,
            b_limit: self.limit,
        }
    }

}

#[cfg(test)]
mod test {
    use crate::map::preset_from_index;

    use super::*;

    #[test]
    fn defaults() {
        let state = ChannelState::default();
        assert_eq!(state.strength, 1);
        assert!(!state.enabled);
        assert_eq!(state.mode, Mode::Preset(Preset::P1));
        assert_eq!(state.legacy_strength(), 0);
    }

    #[test]
    fn strength_op_converts_and_enables() {
        let mut state = ChannelState::default();
        state.apply_strength_op(StrengthOp::Set, 100, 200);
        assert!(state.enabled);
        assert_eq!(state.strength, 138);
        assert_eq!(state.legacy_strength(), 99);
    }

    #[test]
    fn strength_op_preserves_mode() {
        // selecting a preset while disabled only touches the cache; the
        // following strength write must carry that preset out
        let mut state = ChannelState::default();
        state.mode = Mode::Preset(preset_from_index(5));
        state.apply_strength_op(StrengthOp::Set, 100, 200);
        let frame = state.control_frame(Channel::A).encode();
        assert_eq!(frame[6], 0x06);
        assert_eq!(frame[3], 0x01);
    }

    #[test]
    fn increase_and_decrease_clamp() {
        let mut state = ChannelState::default();
        state.apply_strength_op(StrengthOp::Set, 190, 200);
        state.apply_strength_op(StrengthOp::Increase, 50, 200);
        assert!(state.legacy_strength() >= 199);
        state.apply_strength_op(StrengthOp::Decrease, 500, 200);
        assert_eq!(state.legacy_strength(), 0);
        assert!(!state.enabled);
    }

    #[test]
    fn decrease_to_zero_disables() {
        let mut state = ChannelState::default();
        state.apply_strength_op(StrengthOp::Set, 10, 200);
        assert!(state.enabled);
        state.apply_strength_op(StrengthOp::Set, 0, 200);
        assert!(!state.enabled);
        assert_eq!(state.strength, 1);
    }

    #[test]
    fn custom_mode_reasserts_last_wave() {
        let mut state = ChannelState::default();
        state.apply_strength_op(StrengthOp::Set, 80, 200);
        state.mode = Mode::Custom;
        state.wave = (90, 40);
        let frame = state.control_frame(Channel::B).encode();
        assert_eq!(frame[2], 0x02);
        assert_eq!(frame[6], 0x11);
        assert_eq!(frame[7], 90);
        assert_eq!(frame[8], 40);
    }

    #[test]
    fn stop_composes_disable_frame() {
        let mut state = ChannelState::default();
        state.mode = Mode::Custom;
        state.apply_strength_op(StrengthOp::Set, 150, 200);
        let frame = state.stop(Channel::A).encode();
        assert_eq!(
            &frame[..9],
            &[0x35, 0x11, 0x01, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00]
        );
        assert!(!state.enabled);
        assert_eq!(state.strength, 1);
        // the selected mode survives for the next enable
        assert_eq!(state.mode, Mode::Custom);
    }

    #[test]
    fn snapshot_reflects_both_channels() {
        let shared = SharedState::new(200);
        shared.with_channel(Channel::A, |st| st.apply_strength_op(StrengthOp::Set, 50, 200));
        let data = shared.strength_data();
        assert_eq!(data.a, 49);
        assert_eq!(data.b, 0);
        assert_eq!(data.a_limit, 200);
        assert_eq!(data.b_limit, 200);
    }
}
