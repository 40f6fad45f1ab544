//! Commands sent from the host to the unit.

use super::sum::checksum;
use super::{
    FRAME_HEADER, OP_ANGLE_CONTROL, OP_CHANNEL_CONTROL, OP_MOTOR_CONTROL, OP_QUERY,
    OP_STEP_CONTROL, STRENGTH_MAX, STRENGTH_MIN,
};

/// Channel selector for outgoing channel control.
///
/// `Both` addresses the two outputs in one frame and is only meaningful on
/// the command side; status frames always report a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ChannelSel {
    A = 0x01,
    B = 0x02,
    Both = 0x03,
}

/// One of the 16 built-in waveform programs, wire codes 0x01..=0x10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Preset(u8);

impl Preset {
    /// Program 1, the fallback wherever a valid preset is required.
    pub const P1: Self = Preset(0x01);

    /// Build from a wire code; anything outside 0x01..=0x10 is not a preset.
    pub fn from_code(code: u8) -> Option<Self> {
        (0x01..=0x10).contains(&code).then_some(Preset(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }
}

/// Waveform mode of an outgoing channel-control frame.
///
/// There is deliberately no off inhabitant: the off code is a status-only
/// value, and a disable goes out as `enabled: false` with a preset mode.
/// See [ReportedMode](super::reply::ReportedMode) for the status side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Preset(Preset),
    Custom,
}

impl Mode {
    pub fn code(self) -> u8 {
        match self {
            Mode::Preset(p) => p.code(),
            Mode::Custom => 0x11,
        }
    }
}

/// Vibration motor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotorState {
    Off = 0x00,
    On = 0x01,
    Pulse1 = 0x11,
    Pulse2 = 0x12,
    Pulse3 = 0x13,
}

impl MotorState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Off),
            0x01 => Some(Self::On),
            0x11 => Some(Self::Pulse1),
            0x12 => Some(Self::Pulse2),
            0x13 => Some(Self::Pulse3),
            _ => None,
        }
    }
}

/// Step-counter control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StepOp {
    Off = 0x00,
    On = 0x01,
    Clear = 0x02,
    Pause = 0x03,
    Resume = 0x04,
}

/// Query selector, doubling as the tag of every device-originated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryKind {
    ChannelA = 0x01,
    ChannelB = 0x02,
    Motor = 0x03,
    Battery = 0x04,
    StepCount = 0x05,
    Angle = 0x06,
    Fault = 0x55,
}

impl QueryKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::ChannelA),
            0x02 => Some(Self::ChannelB),
            0x03 => Some(Self::Motor),
            0x04 => Some(Self::Battery),
            0x05 => Some(Self::StepCount),
            0x06 => Some(Self::Angle),
            0x55 => Some(Self::Fault),
            _ => None,
        }
    }
}

/// A complete command frame, ready to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Full re-specification of one channel. Strength is on the device's
    /// 1-276 scale; frequency and pulse width only apply in custom mode.
    ChannelControl {
        channel: ChannelSel,
        enabled: bool,
        strength: u16,
        mode: Mode,
        frequency: u8,
        pulse_width: u8,
    },
    MotorControl(MotorState),
    StepControl(StepOp),
    AngleControl { enabled: bool },
    Query(QueryKind),
}

impl Command {
    /// Encode into wire bytes, applying the protocol's clamping rules and
    /// appending the checksum.
    ///
    /// Clamping lives here rather than in callers: strength is forced into
    /// 1..=276, and outside custom mode the frequency and pulse-width bytes
    /// are zeroed no matter what was passed in.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = match *self {
            Command::ChannelControl {
                channel,
                enabled,
                strength,
                mode,
                frequency,
                pulse_width,
            } => {
                let strength = strength.clamp(STRENGTH_MIN, STRENGTH_MAX);
                let (frequency, pulse_width) = match mode {
                    Mode::Custom => (frequency.clamp(1, 100), pulse_width.min(100)),
                    Mode::Preset(_) => (0, 0),
                };
                vec![
                    FRAME_HEADER,
                    OP_CHANNEL_CONTROL,
                    channel as u8,
                    enabled as u8,
                    (strength >> 8) as u8,
                    (strength & 0xff) as u8,
                    mode.code(),
                    frequency,
                    pulse_width,
                ]
            }
            Command::MotorControl(state) => {
                vec![FRAME_HEADER, OP_MOTOR_CONTROL, state as u8]
            }
            Command::StepControl(op) => {
                vec![FRAME_HEADER, OP_STEP_CONTROL, op as u8]
            }
            Command::AngleControl { enabled } => {
                vec![FRAME_HEADER, OP_ANGLE_CONTROL, enabled as u8]
            }
            Command::Query(kind) => {
                vec![FRAME_HEADER, OP_QUERY, kind as u8]
            }
        };
        out.push(checksum(&out));
        out
    }
}

#[cfg(test)]
mod test {
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    use super::*;

    impl Arbitrary for ChannelSel {
        fn arbitrary(g: &mut Gen) -> Self {
            *g.choose(&[ChannelSel::A, ChannelSel::B, ChannelSel::Both])
                .unwrap()
        }
    }

    impl Arbitrary for Preset {
        fn arbitrary(g: &mut Gen) -> Self {
            Preset::from_code(u8::arbitrary(g) % 16 + 1).unwrap()
        }
    }

    impl Arbitrary for Mode {
        fn arbitrary(g: &mut Gen) -> Self {
            if bool::arbitrary(g) {
                Mode::Custom
            } else {
                Mode::Preset(Preset::arbitrary(g))
            }
        }
    }

    fn channel_control(
        channel: ChannelSel,
        enabled: bool,
        strength: u16,
        mode: Mode,
        frequency: u8,
        pulse_width: u8,
    ) -> Vec<u8> {
        Command::ChannelControl {
            channel,
            enabled,
            strength,
            mode,
            frequency,
            pulse_width,
        }
        .encode()
    }

    #[test]
    fn enable_a_preset_1() {
        // freq/width must be zeroed outside custom mode
        let frame = channel_control(ChannelSel::A, true, 100, Mode::Preset(Preset::P1), 50, 50);
        assert_eq!(
            frame,
            [0x35, 0x11, 0x01, 0x01, 0x00, 0x64, 0x01, 0x00, 0x00, 0xad]
        );
    }

    #[test]
    fn full_strength_custom() {
        let frame = channel_control(ChannelSel::A, true, 276, Mode::Custom, 100, 100);
        let sum = checksum(&frame[..9]);
        assert_eq!(
            frame,
            [0x35, 0x11, 0x01, 0x01, 0x01, 0x14, 0x11, 0x64, 0x64, sum]
        );
    }

    #[test]
    fn strength_clamped_high() {
        let frame = channel_control(ChannelSel::A, true, 500, Mode::Preset(Preset::P1), 0, 0);
        assert_eq!(&frame[4..6], &[0x01, 0x14]);
    }

    #[test]
    fn strength_clamped_low() {
        let frame = channel_control(ChannelSel::A, true, 0, Mode::Preset(Preset::P1), 0, 0);
        assert_eq!(&frame[4..6], &[0x00, 0x01]);
    }

    #[test]
    fn custom_wave_clamped() {
        let frame = channel_control(ChannelSel::B, true, 100, Mode::Custom, 200, 200);
        assert_eq!(frame[7], 100);
        assert_eq!(frame[8], 100);
        let frame = channel_control(ChannelSel::B, true, 100, Mode::Custom, 0, 0);
        assert_eq!(frame[7], 1);
        assert_eq!(frame[8], 0);
    }

    #[test]
    fn motor_control() {
        let frame = Command::MotorControl(MotorState::Off).encode();
        assert_eq!(frame, [0x35, 0x12, 0x00, 0x47]);
        let frame = Command::MotorControl(MotorState::Pulse1).encode();
        assert_eq!(frame[2], 0x11);
    }

    #[test]
    fn step_control() {
        let frame = Command::StepControl(StepOp::Clear).encode();
        assert_eq!(frame.len(), 4);
        assert_eq!(&frame[..3], &[0x35, 0x13, 0x02]);
    }

    #[test]
    fn angle_control() {
        assert_eq!(Command::AngleControl { enabled: true }.encode()[2], 0x01);
        assert_eq!(Command::AngleControl { enabled: false }.encode()[2], 0x00);
    }

    #[test]
    fn query() {
        let frame = Command::Query(QueryKind::Battery).encode();
        assert_eq!(frame, [0x35, 0x71, 0x04, checksum(&[0x35, 0x71, 0x04])]);
    }

    #[quickcheck]
    fn checksum_is_sum_of_prefix(
        enabled: bool,
        strength: u16,
        mode: Mode,
        frequency: u8,
        pulse_width: u8,
    ) -> bool {
        let frame = channel_control(
            ChannelSel::A,
            enabled,
            strength,
            mode,
            frequency,
            pulse_width,
        );
        frame[frame.len() - 1] == checksum(&frame[..frame.len() - 1])
    }

    #[quickcheck]
    fn channel_control_shape(
        channel: ChannelSel,
        enabled: bool,
        strength: u16,
        mode: Mode,
        frequency: u8,
        pulse_width: u8,
    ) -> bool {
        let frame = channel_control(channel, enabled, strength, mode, frequency, pulse_width);
        let encoded_strength = u16::from(frame[4]) << 8 | u16::from(frame[5]);
        frame.len() == 10
            && frame[0] == FRAME_HEADER
            && frame[1] == OP_CHANNEL_CONTROL
            && (0x01..=0x11).contains(&frame[6])
            && (STRENGTH_MIN..=STRENGTH_MAX).contains(&encoded_strength)
    }

    #[quickcheck]
    fn preset_modes_zero_wave_bytes(preset: Preset, frequency: u8, pulse_width: u8) -> bool {
        let frame = channel_control(
            ChannelSel::A,
            true,
            100,
            Mode::Preset(preset),
            frequency,
            pulse_width,
        );
        frame[7] == 0 && frame[8] == 0
    }
}
