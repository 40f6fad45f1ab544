use std::time::Duration;

use futures::StreamExt;

use zaplib::StreamUpdate;

use crate::common::DeviceArgs;

#[derive(clap::Args, Debug)]
pub struct MonitorOpts {
    #[command(flatten)]
    device: DeviceArgs,
    /// Snapshot cadence in milliseconds.
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,
}

impl crate::ToolRun for MonitorOpts {
    async fn run(&self) -> anyhow::Result<()> {
        let bridge = self.device.connect().await?;

        let stream = bridge.strength_stream(Duration::from_millis(self.poll_ms));
        futures::pin_mut!(stream);
        while let Some(update) = stream.next().await {
            match update {
                StreamUpdate::Strength(data) => {
                    println!("a {:>3} / b {:>3}  (limit {})", data.a, data.b, data.a_limit);
                }
                StreamUpdate::Disconnected => {
                    eprintln!("link lost");
                    break;
                }
            }
        }
        Ok(())
    }
}
