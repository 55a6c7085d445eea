use anyhow::Result;
use clap::Parser;

use rtsp_snapshot::Config;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtsp_snapshot=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let config = Config::parse();
    rtsp_snapshot::run(&config)?;
    Ok(())
}
