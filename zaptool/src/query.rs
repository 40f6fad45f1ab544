use zaplib::Channel;

use crate::common::DeviceArgs;

#[derive(clap::Args, Debug)]
pub struct BatteryOpts {
    #[command(flatten)]
    device: DeviceArgs,
}

impl crate::ToolRun for BatteryOpts {
    async fn run(&self) -> anyhow::Result<()> {
        let bridge = self.device.connect().await?;
        match bridge.battery().await? {
            -1 => println!("battery: no reply"),
            pct => println!("battery: {pct}%"),
        }
        bridge.disconnect().await;
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
pub struct StatusOpts {
    #[command(flatten)]
    device: DeviceArgs,
}

impl crate::ToolRun for StatusOpts {
    async fn run(&self) -> anyhow::Result<()> {
        let bridge = self.device.connect().await?;

        for channel in [Channel::A, Channel::B] {
            match bridge.channel_status(channel).await? {
                Some(status) => println!(
                    "channel {channel:?}: {:?}, enabled {}, strength {}, mode {:?}",
                    status.electrode, status.enabled, status.strength, status.mode
                ),
                None => println!("channel {channel:?}: no reply"),
            }
        }
        match bridge.motor_status().await? {
            Some(state) => println!("motor: {state:?}"),
            None => println!("motor: no reply"),
        }
        match bridge.battery().await? {
            -1 => println!("battery: no reply"),
            pct => println!("battery: {pct}%"),
        }

        bridge.disconnect().await;
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
pub struct StepsOpts {
    #[command(flatten)]
    device: DeviceArgs,
    /// Clear the counter instead of reading it.
    #[arg(long)]
    clear: bool,
}

impl crate::ToolRun for StepsOpts {
    async fn run(&self) -> anyhow::Result<()> {
        use zaplib::protocol::StepOp;

        let bridge = self.device.connect().await?;
        if self.clear {
            bridge.set_step_tracking(StepOp::Clear).await?;
            println!("step counter cleared");
        } else {
            bridge.set_step_tracking(StepOp::On).await?;
            match bridge.step_count().await? {
                Some(count) => println!("steps: {count}"),
                None => println!("steps: no reply"),
            }
        }
        bridge.disconnect().await;
        Ok(())
    }
}
