use std::time::Duration;

use zaplib::protocol::MotorState;
use zaplib::{PulseOp, StrengthOp};

use crate::common::{ChannelArg, DeviceArgs};

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum OpArg {
    Set,
    Inc,
    Dec,
}

impl From<OpArg> for StrengthOp {
    fn from(arg: OpArg) -> Self {
        match arg {
            OpArg::Set => StrengthOp::Set,
            OpArg::Inc => StrengthOp::Increase,
            OpArg::Dec => StrengthOp::Decrease,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct StrengthOpts {
    #[command(flatten)]
    device: DeviceArgs,
    channel: ChannelArg,
    #[arg(value_enum)]
    op: OpArg,
    /// Legacy-scale value (0-200).
    value: u16,
}

impl crate::ToolRun for StrengthOpts {
    async fn run(&self) -> anyhow::Result<()> {
        let bridge = self.device.connect().await?;
        bridge
            .set_strength(self.channel.into(), self.op.into(), self.value)
            .await?;
        let data = bridge.strength_data();
        println!("strength: a {} / b {} (limit {})", data.a, data.b, data.a_limit);
        bridge.disconnect().await;
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
pub struct PresetOpts {
    #[command(flatten)]
    device: DeviceArgs,
    channel: ChannelArg,
    /// Preset catalog index (0-15).
    index: u8,
}

impl crate::ToolRun for PresetOpts {
    async fn run(&self) -> anyhow::Result<()> {
        let bridge = self.device.connect().await?;
        bridge
            .set_pulse_preset(self.channel.into(), self.index)
            .await?;
        println!("preset {} selected on {:?}", self.index, self.channel);
        bridge.disconnect().await;
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
pub struct WaveOpts {
    #[command(flatten)]
    device: DeviceArgs,
    channel: ChannelArg,
    /// Strength to drive while the wave plays (legacy scale).
    #[arg(long, default_value_t = 40)]
    strength: u16,
    /// Intensity envelope, one value (0-100) per 100 ms frame.
    #[arg(long, value_delimiter = ',', default_value = "0,20,40,60,80,100,80,60,40,20")]
    envelope: Vec<u8>,
    /// How many times to repeat the envelope.
    #[arg(long, default_value_t = 5)]
    repeat: usize,
}

impl crate::ToolRun for WaveOpts {
    async fn run(&self) -> anyhow::Result<()> {
        let channel = self.channel.into();
        let bridge = self.device.connect().await?;
        bridge
            .set_strength(channel, StrengthOp::Set, self.strength)
            .await?;

        let pulses: Vec<PulseOp> = self
            .envelope
            .iter()
            .map(|&width| ([100; 4], [width; 4]))
            .collect();
        let frames = pulses.len() * self.repeat;
        for _ in 0..self.repeat {
            bridge.add_pulses(channel, &pulses).await?;
            // one frame plays per 100 ms tick
            tokio::time::sleep(Duration::from_millis(100) * pulses.len() as u32).await;
        }
        eprintln!("played {frames} frames");

        bridge.stop_all().await?;
        bridge.disconnect().await;
        Ok(())
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum MotorArg {
    Off,
    On,
    P1,
    P2,
    P3,
}

impl From<MotorArg> for MotorState {
    fn from(arg: MotorArg) -> Self {
        match arg {
            MotorArg::Off => MotorState::Off,
            MotorArg::On => MotorState::On,
            MotorArg::P1 => MotorState::Pulse1,
            MotorArg::P2 => MotorState::Pulse2,
            MotorArg::P3 => MotorState::Pulse3,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct MotorOpts {
    #[command(flatten)]
    device: DeviceArgs,
    #[arg(value_enum)]
    state: MotorArg,
}

impl crate::ToolRun for MotorOpts {
    async fn run(&self) -> anyhow::Result<()> {
        let bridge = self.device.connect().await?;
        bridge.set_motor(self.state.into()).await?;
        println!("motor: {:?}", self.state);
        bridge.disconnect().await;
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
pub struct StopOpts {
    #[command(flatten)]
    device: DeviceArgs,
}

impl crate::ToolRun for StopOpts {
    async fn run(&self) -> anyhow::Result<()> {
        let bridge = self.device.connect().await?;
        bridge.stop_all().await?;
        println!("all outputs stopped");
        bridge.disconnect().await;
        Ok(())
    }
}
