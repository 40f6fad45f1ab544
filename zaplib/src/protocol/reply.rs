//! Replies and unsolicited status frames from the unit.

use nom::combinator::map_opt;
use nom::number::complete::{be_i16, be_u16, u8 as byte};
use nom::IResult;

use super::command::{MotorState, Preset, QueryKind};
use super::sum::{checksum, SumStyle};
use super::{FRAME_HEADER, OP_QUERY};

/// Electrode connection state of one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElectrodeStatus {
    NotConnected = 0x00,
    /// Electrode attached and currently discharging.
    ConnectedActive = 0x01,
    /// Electrode attached but idle.
    ConnectedInactive = 0x02,
}

impl ElectrodeStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::NotConnected),
            0x01 => Some(Self::ConnectedActive),
            0x02 => Some(Self::ConnectedInactive),
            _ => None,
        }
    }
}

/// Waveform mode as reported in a status frame.
///
/// Unlike the command-side [Mode](super::command::Mode) this can be off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportedMode {
    Off,
    Preset(Preset),
    Custom,
}

impl ReportedMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Off),
            0x11 => Some(Self::Custom),
            c => Preset::from_code(c).map(Self::Preset),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Off => 0x00,
            Self::Preset(p) => p.code(),
            Self::Custom => 0x11,
        }
    }
}

/// Fault codes the unit reports on its error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceFault {
    Checksum = 0x01,
    Header = 0x02,
    Command = 0x03,
    Data = 0x04,
    Unimplemented = 0x05,
}

impl DeviceFault {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Checksum),
            0x02 => Some(Self::Header),
            0x03 => Some(Self::Command),
            0x04 => Some(Self::Data),
            0x05 => Some(Self::Unimplemented),
            _ => None,
        }
    }
}

/// Snapshot of one channel as reported by the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    pub electrode: ElectrodeStatus,
    pub enabled: bool,
    /// Device scale, 1-276.
    pub strength: u16,
    pub mode: ReportedMode,
}

/// One six-axis IMU reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImuSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// Everything the unit can send back, tagged by query kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    ChannelA(ChannelStatus),
    ChannelB(ChannelStatus),
    Motor(MotorState),
    /// Battery charge in percent.
    Battery(u8),
    StepCount(u16),
    Imu(ImuSample),
    Fault(DeviceFault),
}

impl Reply {
    /// The query kind this reply answers.
    pub fn kind(&self) -> QueryKind {
        match self {
            Reply::ChannelA(_) => QueryKind::ChannelA,
            Reply::ChannelB(_) => QueryKind::ChannelB,
            Reply::Motor(_) => QueryKind::Motor,
            Reply::Battery(_) => QueryKind::Battery,
            Reply::StepCount(_) => QueryKind::StepCount,
            Reply::Imu(_) => QueryKind::Angle,
            Reply::Fault(_) => QueryKind::Fault,
        }
    }

    /// Channel status carried by this reply, if it is one.
    pub fn channel_status(&self) -> Option<ChannelStatus> {
        match self {
            Reply::ChannelA(s) | Reply::ChannelB(s) => Some(*s),
            _ => None,
        }
    }
}

/// Outcome of scanning one notification for a reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// A complete, well-formed reply.
    Ok(Reply),
    /// The checksum byte did not match under the active policy.
    SumErr { expected: u8, actual: u8 },
    /// Looks like a frame but is missing bytes.
    Incomplete,
    /// Not a reply frame at all.
    None,
}

impl ParseResult {
    pub fn ok(self) -> Option<Reply> {
        match self {
            Self::Ok(reply) => Some(reply),
            _ => None,
        }
    }
}

fn channel_status(input: &[u8]) -> IResult<&[u8], ChannelStatus> {
    let (input, electrode) = map_opt(byte, ElectrodeStatus::from_code)(input)?;
    let (input, enabled) = byte(input)?;
    let (input, strength) = be_u16(input)?;
    let (input, mode) = map_opt(byte, ReportedMode::from_code)(input)?;
    Ok((
        input,
        ChannelStatus {
            electrode,
            enabled: enabled == 0x01,
            strength,
            mode,
        },
    ))
}

fn imu_sample(input: &[u8]) -> IResult<&[u8], ImuSample> {
    let (input, ax) = be_i16(input)?;
    let (input, ay) = be_i16(input)?;
    let (input, az) = be_i16(input)?;
    let (input, gx) = be_i16(input)?;
    let (input, gy) = be_i16(input)?;
    let (input, gz) = be_i16(input)?;
    Ok((
        input,
        ImuSample {
            accel: [ax, ay, az],
            gyro: [gx, gy, gz],
        },
    ))
}

/// Interpret one notification as a reply frame.
///
/// The frame must open with the header sentinel and carry the query opcode;
/// anything else (including echoes of our own commands, which the unit does
/// not produce anyway) is [ParseResult::None]. Frames that are recognizably
/// a reply but short on bytes are [ParseResult::Incomplete]. The checksum
/// is checked before the payload is touched, under the given policy.
pub fn parse_reply<S>(style: &S, data: &[u8]) -> ParseResult
where
    S: SumStyle,
{
    match data.first() {
        None => return ParseResult::Incomplete,
        Some(&head) if head != FRAME_HEADER => return ParseResult::None,
        Some(_) => {}
    }
    if data.len() < 4 {
        return ParseResult::Incomplete;
    }

    let provided = data[data.len() - 1];
    let calculated = checksum(&data[..data.len() - 1]);
    if !style.validate(calculated, provided) {
        return ParseResult::SumErr {
            expected: calculated,
            actual: provided,
        };
    }

    if data[1] != OP_QUERY {
        return ParseResult::None;
    }

    let Some(kind) = QueryKind::from_code(data[2]) else {
        return ParseResult::None;
    };
    let payload = &data[3..];

    // required sizes include header, query-type and checksum bytes
    let needed = match kind {
        QueryKind::ChannelA | QueryKind::ChannelB => 9,
        QueryKind::Motor | QueryKind::Battery | QueryKind::Fault => 5,
        QueryKind::StepCount => 6,
        QueryKind::Angle => 16,
    };
    if data.len() < needed {
        return ParseResult::Incomplete;
    }

    let parsed = match kind {
        QueryKind::ChannelA => channel_status(payload).map(|(_, s)| Reply::ChannelA(s)),
        QueryKind::ChannelB => channel_status(payload).map(|(_, s)| Reply::ChannelB(s)),
        QueryKind::Motor => {
            map_opt(byte, MotorState::from_code)(payload).map(|(_, s)| Reply::Motor(s))
        }
        QueryKind::Battery => byte::<_, nom::error::Error<&[u8]>>(payload)
            .map(|(_, pct)| Reply::Battery(pct)),
        QueryKind::StepCount => {
            be_u16::<_, nom::error::Error<&[u8]>>(payload).map(|(_, n)| Reply::StepCount(n))
        }
        QueryKind::Angle => imu_sample(payload).map(|(_, s)| Reply::Imu(s)),
        QueryKind::Fault => {
            map_opt(byte, DeviceFault::from_code)(payload).map(|(_, f)| Reply::Fault(f))
        }
    };

    match parsed {
        Ok(reply) => ParseResult::Ok(reply),
        // field codes outside the protocol's value sets
        Err(_) => ParseResult::None,
    }
}
