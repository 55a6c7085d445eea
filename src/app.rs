use std::fs;
use std::sync::Arc;

use gstreamer as gst;
use tracing::info;

use crate::capture::FrameCapture;
use crate::config::Config;
use crate::error::SetupError;
use crate::monitor::LifecycleMonitor;
use crate::pad;
use crate::snapshot::SnapshotWriter;
use crate::topology::SnapshotPipeline;

/// Builds the pipeline, wires the handlers and blocks until the stream
/// errors, ends, or the process is interrupted.
pub fn run(config: &Config) -> Result<(), SetupError> {
    gst::init()?;
    fs::create_dir_all(&config.output_dir)?;

    let pipeline = SnapshotPipeline::build(config)?;

    pipeline.on_pad_added(|new_pad, depay_sink| {
        pad::resolve(new_pad, depay_sink);
    })?;

    let capture = Arc::new(FrameCapture::new(
        SnapshotWriter::new(&config.output_dir, config.format, config.quality),
        config.every,
    ));
    let handler = capture.clone();
    pipeline.on_new_sample(move |sink| handler.on_new_sample(sink).flow_return());

    let monitor = Arc::new(LifecycleMonitor::new(pipeline.main_loop()));
    let on_error = monitor.clone();
    pipeline.on_bus_error(move |err| {
        on_error.on_error(err);
    })?;
    let on_eos = monitor.clone();
    pipeline.on_eos(move || {
        on_eos.on_eos();
    })?;
    let on_interrupt = monitor.clone();
    ctrlc::set_handler(move || {
        on_interrupt.interrupt();
    })?;

    info!(
        url = %config.url,
        output = %config.output_dir.display(),
        every = config.every,
        "starting capture"
    );
    pipeline.play()?;
    pipeline.run();
    pipeline.stop()?;

    info!(
        seen = capture.seen(),
        saved = capture.saved(),
        "capture finished"
    );
    Ok(())
}
