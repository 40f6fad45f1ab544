mod common;
mod control;
mod monitor;
mod query;
mod scan;

trait ToolRun {
    async fn run(&self) -> anyhow::Result<()>;
}

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct ToolOptions {
    #[command(subcommand)]
    command: ToolCommand,
}

#[derive(clap::Subcommand, Debug)]
enum ToolCommand {
    Scan(scan::ScanOpts),
    Battery(query::BatteryOpts),
    Status(query::StatusOpts),
    Steps(query::StepsOpts),
    Strength(control::StrengthOpts),
    Preset(control::PresetOpts),
    Wave(control::WaveOpts),
    Motor(control::MotorOpts),
    Stop(control::StopOpts),
    Monitor(monitor::MonitorOpts),
}

impl ToolRun for ToolCommand {
    async fn run(&self) -> anyhow::Result<()> {
        use ToolCommand::*;
        match self {
            Scan(o) => o.run().await,
            Battery(o) => o.run().await,
            Status(o) => o.run().await,
            Steps(o) => o.run().await,
            Strength(o) => o.run().await,
            Preset(o) => o.run().await,
            Wave(o) => o.run().await,
            Motor(o) => o.run().await,
            Stop(o) => o.run().await,
            Monitor(o) => o.run().await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    use clap::Parser;
    let opts = ToolOptions::parse();

    opts.command.run().await
}
