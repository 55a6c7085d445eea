//! Pull an RTSP H.264 stream through GStreamer, decode it and write periodic
//! snapshots of the decoded frames to disk.
//!
//! GStreamer does all of the media work. This crate assembles the pipeline
//! ([`topology`]) and supplies the three callbacks it drives:
//! - [`pad::resolve`] links the RTSP source once its pad is negotiated,
//! - [`FrameCapture::on_new_sample`] turns each completed sample into a file,
//! - [`LifecycleMonitor`] stops the main loop on bus errors or end-of-stream.
//!
//! The callbacks are written against small traits so they can be driven
//! without a running pipeline.

pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod pad;
pub mod snapshot;
pub mod topology;

pub use app::run;
pub use capture::{CaptureStatus, FrameCapture, FrameSample, SampleSource};
pub use config::{Config, OutputFormat};
pub use error::{CaptureError, SetupError};
pub use frame::{CapturedFrame, PixelOrder, StreamFormat};
pub use monitor::{BusError, LifecycleMonitor, RunLoop};
pub use pad::{DownstreamPad, NewPad, PadOutcome};
pub use snapshot::{SnapshotNamer, SnapshotWriter};
pub use topology::SnapshotPipeline;
