//! Linking the RTSP source's dynamic pad to the depayloader.
//!
//! `rtspsrc` only exposes its output pads once the SDP has been negotiated,
//! so the link to `rtph264depay` is made from the `pad-added` notification.
//! The depayloader's sink pad is linked at most once; any later pad (a second
//! video stream, a reconnect) is ignored.

use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info, warn};

/// The fixed input pad new source pads are linked to.
pub trait DownstreamPad {
    fn already_linked(&self) -> bool;
}

/// A pad announced by the source after negotiation.
pub trait NewPad {
    type Peer: DownstreamPad;

    fn pad_name(&self) -> String;

    /// Name of the first caps structure, e.g. `application/x-rtp`.
    fn negotiated_type(&self) -> Option<String>;

    /// RTP `media` field of the caps, when present.
    fn media(&self) -> Option<String>;

    fn link_downstream(&self, peer: &Self::Peer) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PadOutcome {
    AlreadyLinked,
    /// Not a video stream (audio or metadata track).
    Ignored { media: String },
    Linked { media_type: String },
    LinkFailed { media_type: String, reason: String },
}

/// Handles one `pad-added` notification. Never panics; a failed link is
/// reported and leaves the pipeline without data flow.
pub fn resolve<P: NewPad>(new_pad: &P, sink: &P::Peer) -> PadOutcome {
    let name = new_pad.pad_name();
    debug!(pad = %name, "received new pad");

    if sink.already_linked() {
        info!(pad = %name, "depayloader already linked, ignoring");
        return PadOutcome::AlreadyLinked;
    }

    if let Some(media) = new_pad.media().filter(|m| m != "video") {
        info!(pad = %name, %media, "not a video stream, ignoring");
        return PadOutcome::Ignored { media };
    }

    let media_type = new_pad
        .negotiated_type()
        .unwrap_or_else(|| "unknown".to_string());

    match new_pad.link_downstream(sink) {
        Ok(()) => {
            info!(pad = %name, %media_type, "link succeeded");
            PadOutcome::Linked { media_type }
        }
        Err(reason) => {
            warn!(pad = %name, %media_type, %reason, "link failed");
            PadOutcome::LinkFailed { media_type, reason }
        }
    }
}

impl DownstreamPad for gst::Pad {
    fn already_linked(&self) -> bool {
        PadExt::is_linked(self)
    }
}

impl NewPad for gst::Pad {
    type Peer = gst::Pad;

    fn pad_name(&self) -> String {
        self.name().to_string()
    }

    fn negotiated_type(&self) -> Option<String> {
        let caps = self.current_caps()?;
        caps.structure(0).map(|s| s.name().to_string())
    }

    fn media(&self) -> Option<String> {
        let caps = self.current_caps()?;
        caps.structure(0)
            .and_then(|s| s.get::<&str>("media").ok())
            .map(str::to_string)
    }

    fn link_downstream(&self, peer: &gst::Pad) -> Result<(), String> {
        self.link(peer).map(|_| ()).map_err(|e| format!("{e:?}"))
    }
}
