use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Image container written for every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "rtsp-snapshot",
    about = "Decode an RTSP H.264 stream and save frames as images"
)]
pub struct Config {
    /// RTSP location, credentials may be embedded (rtsp://user:pw@host:554/0)
    #[arg(long, env = "RTSP_URL")]
    pub url: String,

    /// Jitter buffer size of the RTSP source in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub latency: u32,

    /// Directory snapshots are written to
    #[arg(long, default_value = "./out")]
    pub output_dir: PathBuf,

    /// H.264 decoder element
    #[arg(long, default_value = "nvv4l2decoder")]
    pub decoder: String,

    /// Hardware converter placed between the decoder and videoconvert
    #[arg(long, default_value = "nvvidconv")]
    pub hw_convert: String,

    /// Skip the hardware converter (software decoders)
    #[arg(long)]
    pub no_hw_convert: bool,

    /// Caps requested from the sink
    #[arg(long, default_value = "video/x-raw,format=BGR")]
    pub caps: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Jpeg)]
    pub format: OutputFormat,

    /// JPEG quality
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// Save every Nth decoded frame
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub every: u64,

    /// Synchronise the sink on the pipeline clock
    #[arg(long)]
    pub sync: bool,
}

impl Config {
    /// Element factory for the hardware converter stage, if enabled.
    pub fn hw_converter(&self) -> Option<&str> {
        (!self.no_hw_convert).then_some(self.hw_convert.as_str())
    }
}
