//! Pipeline assembly and the event hooks callers attach to it.
//!
//! ```text
//! rtspsrc ~> rtph264depay ! queue ! h264parse ! <decoder> ! [<hw convert>] ! videoconvert ! appsink
//! ```
//!
//! `~>` is the dynamic link made from `pad-added`; everything else is linked
//! here, before the pipeline starts.

use std::str::FromStr;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::SetupError;
use crate::monitor::BusError;

/// Owns the pipeline, the elements the callbacks need, and the run loop.
/// Element handles are set once here and only read afterwards.
pub struct SnapshotPipeline {
    pipeline: gst::Pipeline,
    source: gst::Element,
    depay: gst::Element,
    sink: gst_app::AppSink,
    main_loop: glib::MainLoop,
}

fn make(factory: &str, name: &str) -> Result<gst::Element, SetupError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|_| SetupError::MissingElement {
            factory: factory.to_string(),
        })
}

/// Links `elements` pairwise in order, naming the pair that failed.
fn link_chain(elements: &[gst::Element]) -> Result<(), SetupError> {
    for pair in elements.windows(2) {
        pair[0].link(&pair[1]).map_err(|_| SetupError::Link {
            upstream: pair[0].name().to_string(),
            downstream: pair[1].name().to_string(),
        })?;
    }
    Ok(())
}

impl SnapshotPipeline {
    /// Creates every element, configures source and sink, adds them to one
    /// pipeline and links everything from the depayloader on. The source is
    /// left unlinked until [`on_pad_added`](Self::on_pad_added) fires.
    pub fn build(config: &Config) -> Result<Self, SetupError> {
        let caps =
            gst::Caps::from_str(&config.caps).map_err(|_| SetupError::Caps(config.caps.clone()))?;

        let source = make("rtspsrc", "source")?;
        let depay = make("rtph264depay", "depay")?;
        let queue = make("queue", "queue")?;
        let parse = make("h264parse", "parse")?;
        let decoder = make(&config.decoder, "decoder")?;
        let hw_convert = config
            .hw_converter()
            .map(|factory| make(factory, "hwconvert"))
            .transpose()?;
        let convert = make("videoconvert", "videoconvert")?;
        let sink = make("appsink", "sink")?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| SetupError::MissingElement {
                factory: "appsink".to_string(),
            })?;

        source.set_property("location", config.url.as_str());
        source.set_property("latency", config.latency);

        sink.set_caps(Some(&caps));
        sink.set_property("sync", config.sync);
        // Only the newest frame matters; never back up the decoder.
        sink.set_property("max-buffers", 1u32);
        sink.set_property("drop", true);

        let pipeline = gst::Pipeline::with_name("snapshot-pipeline");

        let mut chain = vec![depay.clone(), queue, parse, decoder];
        chain.extend(hw_convert);
        chain.push(convert);
        chain.push(sink.clone().upcast());

        pipeline
            .add_many(std::iter::once(&source).chain(&chain))
            .map_err(|e| SetupError::Add(e.to_string()))?;
        link_chain(&chain)?;

        // Bus messages are dispatched from the default main context.
        pipeline.bus().ok_or(SetupError::NoBus)?.add_signal_watch();

        debug!(
            stages = ?chain.iter().map(|e| e.name().to_string()).collect::<Vec<_>>(),
            "static chain linked"
        );

        Ok(SnapshotPipeline {
            pipeline,
            source,
            depay,
            sink,
            main_loop: glib::MainLoop::new(None, false),
        })
    }

    pub fn pipeline(&self) -> &gst::Pipeline {
        &self.pipeline
    }

    pub fn main_loop(&self) -> glib::MainLoop {
        self.main_loop.clone()
    }

    /// Calls `handler(new_pad, depay_sink_pad)` for every pad the source exposes.
    pub fn on_pad_added<F>(&self, handler: F) -> Result<(), SetupError>
    where
        F: Fn(&gst::Pad, &gst::Pad) + Send + Sync + 'static,
    {
        let sink_pad = self
            .depay
            .static_pad("sink")
            .ok_or_else(|| SetupError::MissingPad {
                element: self.depay.name().to_string(),
                pad: "sink".to_string(),
            })?;
        self.source
            .connect_pad_added(move |_src, new_pad| handler(new_pad, &sink_pad));
        Ok(())
    }

    /// Calls `handler` once per completed buffer on the sink.
    pub fn on_new_sample<F>(&self, handler: F)
    where
        F: FnMut(&gst_app::AppSink) -> Result<gst::FlowSuccess, gst::FlowError> + Send + 'static,
    {
        self.sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(handler)
                .build(),
        );
    }

    /// Calls `handler` for every error posted on the pipeline bus. Dispatched
    /// from the main loop.
    pub fn on_bus_error<F>(&self, handler: F) -> Result<(), SetupError>
    where
        F: Fn(&BusError) + Send + Sync + 'static,
    {
        let bus = self.bus()?;
        bus.connect_message(Some("error"), move |_, msg| {
            if let gst::MessageView::Error(err) = msg.view() {
                handler(&BusError::from_message(err));
            }
        });
        Ok(())
    }

    pub fn on_eos<F>(&self, handler: F) -> Result<(), SetupError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let bus = self.bus()?;
        bus.connect_message(Some("eos"), move |_, _| handler());
        Ok(())
    }

    fn bus(&self) -> Result<gst::Bus, SetupError> {
        self.pipeline.bus().ok_or(SetupError::NoBus)
    }

    pub fn play(&self) -> Result<(), SetupError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| SetupError::StateChange(gst::State::Playing))?;
        info!("pipeline playing");
        Ok(())
    }

    /// Blocks until a handler quits the main loop.
    pub fn run(&self) {
        self.main_loop.run();
    }

    pub fn stop(&self) -> Result<(), SetupError> {
        if let Some(bus) = self.pipeline.bus() {
            bus.remove_signal_watch();
        }
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|_| SetupError::StateChange(gst::State::Null))?;
        info!("pipeline stopped");
        Ok(())
    }
}

impl Drop for SnapshotPipeline {
    fn drop(&mut self) {
        // Covers early returns between `play` and `stop`.
        self.pipeline.set_state(gst::State::Null).ok();
    }
}
