//! Frame capture: pull the completed sample from the sink, map it, and save
//! it as an image.
//!
//! The handler runs on a GStreamer streaming thread. It only touches the
//! sample it pulled and its own counters, so it is `Send + Sync` and needs no
//! locking. The sample and its mapped view are RAII guards: both are released
//! on every return path.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::frame::{CapturedFrame, StreamFormat, row_stride};
use crate::snapshot::SnapshotWriter;

/// One completed unit of sink output.
pub trait FrameSample {
    /// Read-only view of the buffer bytes; dropping it unmaps.
    type Mapped<'a>: Deref<Target = [u8]>
    where
        Self: 'a;

    /// Negotiated format, `None` when the sample carries no caps.
    fn format(&self) -> Option<StreamFormat>;

    fn map_frame(&self) -> Result<Self::Mapped<'_>, CaptureError>;

    /// Row stride recorded on the buffer itself (`VideoMeta`), if any.
    fn meta_stride(&self) -> Option<usize> {
        None
    }
}

/// Something that hands out the latest completed sample.
pub trait SampleSource {
    type Sample: FrameSample;

    fn latest_sample(&self) -> Option<Self::Sample>;
}

/// Flow-control answer handed back to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Ok,
    Error,
}

impl CaptureStatus {
    pub fn flow_return(self) -> Result<gst::FlowSuccess, gst::FlowError> {
        match self {
            CaptureStatus::Ok => Ok(gst::FlowSuccess::Ok),
            CaptureStatus::Error => Err(gst::FlowError::Error),
        }
    }
}

#[derive(Debug)]
pub struct FrameCapture {
    writer: SnapshotWriter,
    every: u64,
    seen: AtomicU64,
    saved: AtomicU64,
}

impl FrameCapture {
    /// Saves every `every`th sample (1 saves all of them).
    pub fn new(writer: SnapshotWriter, every: u64) -> Self {
        FrameCapture {
            writer,
            every: every.max(1),
            seen: AtomicU64::new(0),
            saved: AtomicU64::new(0),
        }
    }

    pub fn saved(&self) -> u64 {
        self.saved.load(Ordering::Relaxed)
    }

    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    /// Sink callback body. No sample is a neutral `Ok`; any per-frame failure
    /// is logged and answered with `Error`.
    pub fn on_new_sample<S: SampleSource>(&self, sink: &S) -> CaptureStatus {
        let Some(sample) = sink.latest_sample() else {
            return CaptureStatus::Ok;
        };

        let n = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.every != 0 {
            return CaptureStatus::Ok;
        }

        match self.save(&sample) {
            Ok(path) => {
                self.saved.fetch_add(1, Ordering::Relaxed);
                info!(frame = n, path = %path.display(), "snapshot saved");
                CaptureStatus::Ok
            }
            Err(err) => {
                warn!(frame = n, %err, "frame not saved");
                CaptureStatus::Error
            }
        }
    }

    fn save<T: FrameSample>(&self, sample: &T) -> Result<std::path::PathBuf, CaptureError> {
        let format = sample.format().ok_or(CaptureError::NoCaps)?;
        let (width, height) = format.dimensions()?;
        let order = format.pixel_order()?;
        debug!(width, height, media_type = %format.media_type, "sample caps");

        let map = sample.map_frame()?;
        let stride = row_stride(sample.meta_stride(), format.stride, map.len(), width, height);
        let frame = CapturedFrame::new(&*map, width, height, stride, order)?;
        debug!(
            size = map.len(),
            packed = frame.is_tightly_packed(),
            "buffer mapped"
        );
        self.writer.write(&frame)
    }
}

impl FrameSample for gst::Sample {
    type Mapped<'a> = gst::BufferMap<'a, gst::buffer::Readable>;

    fn format(&self) -> Option<StreamFormat> {
        self.caps().and_then(StreamFormat::from_caps)
    }

    fn map_frame(&self) -> Result<Self::Mapped<'_>, CaptureError> {
        let buffer = self.buffer().ok_or(CaptureError::NoBuffer)?;
        buffer
            .map_readable()
            .map_err(|e| CaptureError::Map(e.to_string()))
    }

    fn meta_stride(&self) -> Option<usize> {
        let meta = self.buffer()?.meta::<gst_video::VideoMeta>()?;
        meta.stride()
            .first()
            .and_then(|&stride| usize::try_from(stride).ok())
    }
}

impl SampleSource for gst_app::AppSink {
    type Sample = gst::Sample;

    fn latest_sample(&self) -> Option<gst::Sample> {
        self.pull_sample().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Tracker {
        mapped: AtomicUsize,
        unmapped: AtomicUsize,
        released: AtomicUsize,
    }

    impl Tracker {
        fn counts(&self) -> (usize, usize, usize) {
            (
                self.mapped.load(Ordering::SeqCst),
                self.unmapped.load(Ordering::SeqCst),
                self.released.load(Ordering::SeqCst),
            )
        }
    }

    struct FakeSample {
        format: Option<StreamFormat>,
        data: Vec<u8>,
        map_fails: bool,
        tracker: Arc<Tracker>,
    }

    impl Drop for FakeSample {
        fn drop(&mut self) {
            self.tracker.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeMap<'a> {
        data: &'a [u8],
        tracker: &'a Tracker,
    }

    impl Deref for FakeMap<'_> {
        type Target = [u8];

        fn deref(&self) -> &[u8] {
            self.data
        }
    }

    impl Drop for FakeMap<'_> {
        fn drop(&mut self) {
            self.tracker.unmapped.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl FrameSample for FakeSample {
        type Mapped<'a> = FakeMap<'a>;

        fn format(&self) -> Option<StreamFormat> {
            self.format.clone()
        }

        fn map_frame(&self) -> Result<FakeMap<'_>, CaptureError> {
            if self.map_fails {
                return Err(CaptureError::Map("read-only memory".into()));
            }
            self.tracker.mapped.fetch_add(1, Ordering::SeqCst);
            Ok(FakeMap {
                data: &self.data,
                tracker: &self.tracker,
            })
        }
    }

    #[derive(Default)]
    struct FakeSink {
        queue: Mutex<Vec<FakeSample>>,
    }

    impl FakeSink {
        fn push(&self, sample: FakeSample) {
            self.queue.lock().unwrap().insert(0, sample);
        }
    }

    impl SampleSource for FakeSink {
        type Sample = FakeSample;

        fn latest_sample(&self) -> Option<FakeSample> {
            self.queue.lock().unwrap().pop()
        }
    }

    fn bgr(width: i32, height: i32) -> StreamFormat {
        StreamFormat {
            media_type: "video/x-raw".into(),
            format: Some("BGR".into()),
            width: Some(width),
            height: Some(height),
            stride: None,
        }
    }

    fn sample(format: Option<StreamFormat>, len: usize, tracker: &Arc<Tracker>) -> FakeSample {
        FakeSample {
            format,
            data: vec![90; len],
            map_fails: false,
            tracker: tracker.clone(),
        }
    }

    fn capture(dir: &std::path::Path, every: u64) -> FrameCapture {
        FrameCapture::new(SnapshotWriter::new(dir, OutputFormat::Jpeg, 85), every)
    }

    fn files_in(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn empty_sink_is_neutral() {
        let dir = tempfile::tempdir().unwrap();
        let capture = capture(dir.path(), 1);
        assert_eq!(capture.on_new_sample(&FakeSink::default()), CaptureStatus::Ok);
        assert_eq!(capture.seen(), 0);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn missing_dimension_writes_nothing_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let capture = capture(dir.path(), 1);
        let tracker = Arc::new(Tracker::default());
        let sink = FakeSink::default();

        let mut only_width = bgr(640, 480);
        only_width.height = None;
        sink.push(sample(Some(only_width), 640 * 480 * 3, &tracker));
        let mut only_height = bgr(640, 480);
        only_height.width = None;
        sink.push(sample(Some(only_height), 640 * 480 * 3, &tracker));

        assert_eq!(capture.on_new_sample(&sink), CaptureStatus::Error);
        assert_eq!(capture.on_new_sample(&sink), CaptureStatus::Error);
        assert_eq!(files_in(dir.path()), 0);
        // never mapped, both samples released
        assert_eq!(tracker.counts(), (0, 0, 2));
    }

    #[test]
    fn map_failure_releases_sample() {
        let dir = tempfile::tempdir().unwrap();
        let capture = capture(dir.path(), 1);
        let tracker = Arc::new(Tracker::default());
        let sink = FakeSink::default();
        let mut s = sample(Some(bgr(4, 4)), 48, &tracker);
        s.map_fails = true;
        sink.push(s);

        assert_eq!(capture.on_new_sample(&sink), CaptureStatus::Error);
        assert_eq!(tracker.counts(), (0, 0, 1));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn short_buffer_is_unmapped_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let capture = capture(dir.path(), 1);
        let tracker = Arc::new(Tracker::default());
        let sink = FakeSink::default();
        sink.push(sample(Some(bgr(4, 4)), 47, &tracker));

        assert_eq!(capture.on_new_sample(&sink), CaptureStatus::Error);
        assert_eq!(tracker.counts(), (1, 1, 1));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn odd_width_tight_buffer_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let capture = capture(dir.path(), 1);
        let tracker = Arc::new(Tracker::default());
        let sink = FakeSink::default();
        // Caps round 5 * 3 up to 16 bytes per row; the buffer is packed.
        let format = StreamFormat {
            stride: Some(16),
            ..bgr(5, 3)
        };
        sink.push(sample(Some(format), 5 * 3 * 3, &tracker));

        assert_eq!(capture.on_new_sample(&sink), CaptureStatus::Ok);
        assert_eq!(files_in(dir.path()), 1);
        assert_eq!(tracker.counts(), (1, 1, 1));
    }

    #[test]
    fn bad_frame_does_not_affect_the_next() {
        let dir = tempfile::tempdir().unwrap();
        let capture = capture(dir.path(), 1);
        let tracker = Arc::new(Tracker::default());
        let sink = FakeSink::default();
        sink.push(sample(None, 0, &tracker));
        sink.push(sample(Some(bgr(8, 8)), 8 * 8 * 3, &tracker));

        assert_eq!(capture.on_new_sample(&sink), CaptureStatus::Error);
        assert_eq!(capture.on_new_sample(&sink), CaptureStatus::Ok);
        assert_eq!(capture.saved(), 1);
        assert_eq!(files_in(dir.path()), 1);
        assert_eq!(tracker.counts(), (1, 1, 2));
    }

    #[test]
    fn saves_every_nth_frame() {
        let dir = tempfile::tempdir().unwrap();
        let capture = capture(dir.path(), 3);
        let tracker = Arc::new(Tracker::default());
        let sink = FakeSink::default();
        for _ in 0..7 {
            sink.push(sample(Some(bgr(4, 2)), 24, &tracker));
        }
        for _ in 0..7 {
            assert_eq!(capture.on_new_sample(&sink), CaptureStatus::Ok);
        }

        assert_eq!(capture.seen(), 7);
        assert_eq!(capture.saved(), 2);
        assert_eq!(files_in(dir.path()), 2);
        // skipped samples are released without mapping
        assert_eq!(tracker.counts(), (2, 2, 7));
    }

    #[test]
    fn status_maps_to_flow_return() {
        assert_eq!(CaptureStatus::Ok.flow_return(), Ok(gst::FlowSuccess::Ok));
        assert_eq!(CaptureStatus::Error.flow_return(), Err(gst::FlowError::Error));
    }
}
