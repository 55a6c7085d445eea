//! Error types.
//!
//! - [`SetupError`]: anything that stops the pipeline from starting. These are
//!   fatal and end the process with a non-zero exit code.
//! - [`CaptureError`]: a single frame could not be turned into a snapshot.
//!   The sink callback logs it and the stream keeps running.

use gstreamer as gst;

/// Failures while assembling or starting the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("GStreamer initialization failed: {0}")]
    Init(#[from] glib::Error),

    /// `gst_element_factory_make` returned nothing (plugin not installed).
    #[error("element '{factory}' could not be created")]
    MissingElement { factory: String },

    #[error("could not parse caps '{0}'")]
    Caps(String),

    #[error("could not add elements to the pipeline: {0}")]
    Add(String),

    #[error("element '{element}' has no '{pad}' pad")]
    MissingPad { element: String, pad: String },

    #[error("elements could not be linked: {upstream} -> {downstream}")]
    Link { upstream: String, downstream: String },

    #[error("pipeline has no bus")]
    NoBus,

    #[error("unable to set the pipeline to the {0:?} state")]
    StateChange(gst::State),

    #[error("output directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not install the interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Failures while turning one completed sample into a file.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("sample carries no caps")]
    NoCaps,

    #[error("caps have no readable '{0}' field")]
    MissingDimension(&'static str),

    #[error("invalid frame size {width}x{height}")]
    InvalidDimension { width: i32, height: i32 },

    #[error("unsupported pixel format '{0}'")]
    UnsupportedFormat(String),

    #[error("sample carries no buffer")]
    NoBuffer,

    #[error("buffer could not be mapped: {0}")]
    Map(String),

    #[error("buffer holds {actual} bytes, frame needs {expected}")]
    ShortBuffer { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
}
