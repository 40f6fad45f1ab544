use std::time::Duration;

#[derive(clap::Args, Debug)]
pub struct ScanOpts {
    /// Scan timeout in seconds.
    #[arg(long, default_value_t = 10)]
    scan_timeout: u64,
}

impl crate::ToolRun for ScanOpts {
    async fn run(&self) -> anyhow::Result<()> {
        eprintln!("scanning for {} s...", self.scan_timeout);
        let found = zaplib::scanner::scan(Duration::from_secs(self.scan_timeout)).await?;
        if found.is_empty() {
            eprintln!("no units in range");
            return Ok(());
        }
        for device in found {
            match device.rssi {
                Some(rssi) => println!("{device}  rssi {rssi}"),
                None => println!("{device}"),
            }
        }
        Ok(())
    }
}
