//! Negotiated stream format and the read-only frame view built from a mapped buffer.

use gstreamer as gst;
use gstreamer_video as gst_video;
use image::RgbImage;

use crate::error::CaptureError;

/// Channel order of a packed 3-channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Bgr,
    Rgb,
}

impl PixelOrder {
    pub const CHANNELS: usize = 3;

    /// Maps a raw video `format` field. A missing field is taken as BGR, the
    /// layout the sink asks for by default.
    pub fn from_format(format: Option<&str>) -> Result<Self, CaptureError> {
        match format {
            None | Some("BGR") => Ok(PixelOrder::Bgr),
            Some("RGB") => Ok(PixelOrder::Rgb),
            Some(other) => Err(CaptureError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// What the caps of one sample say about its frame. Width and height are read
/// independently so a caller can tell which one is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFormat {
    pub media_type: String,
    pub format: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// Bytes per row GStreamer would allocate for these caps. Packed 24-bit
    /// rows are rounded up to 4 bytes here, so this is only a fallback for
    /// buffers that carry no `VideoMeta`.
    pub stride: Option<usize>,
}

impl StreamFormat {
    /// Reads the first structure of `caps`. Returns `None` for empty caps.
    pub fn from_caps(caps: &gst::CapsRef) -> Option<Self> {
        let s = caps.structure(0)?;
        let stride = gst_video::VideoInfo::from_caps(caps)
            .ok()
            .and_then(|info| info.stride().first().copied())
            .and_then(|stride| usize::try_from(stride).ok());

        Some(StreamFormat {
            media_type: s.name().to_string(),
            format: s.get::<&str>("format").ok().map(str::to_string),
            width: s.get::<i32>("width").ok(),
            height: s.get::<i32>("height").ok(),
            stride,
        })
    }

    /// Both dimensions must be present and positive.
    pub fn dimensions(&self) -> Result<(u32, u32), CaptureError> {
        let width = self.width.ok_or(CaptureError::MissingDimension("width"))?;
        let height = self.height.ok_or(CaptureError::MissingDimension("height"))?;
        match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
            _ => Err(CaptureError::InvalidDimension { width, height }),
        }
    }

    pub fn pixel_order(&self) -> Result<PixelOrder, CaptureError> {
        PixelOrder::from_format(self.format.as_deref())
    }
}

/// Picks the row stride for a mapped buffer of `len` bytes.
///
/// A `VideoMeta` stride wins. Otherwise a buffer of exactly `width * 3 * height`
/// bytes is tightly packed, and only a longer one uses the caps stride.
pub fn row_stride(
    meta_stride: Option<usize>,
    caps_stride: Option<usize>,
    len: usize,
    width: u32,
    height: u32,
) -> Option<usize> {
    if meta_stride.is_some() {
        return meta_stride;
    }
    let row = width as usize * PixelOrder::CHANNELS;
    if len > row * height as usize {
        caps_stride
    } else {
        None
    }
}

/// Read-only view of one mapped frame. Borrowing the mapped bytes ties the
/// view to the map scope: it cannot outlive the unmap.
#[derive(Debug)]
pub struct CapturedFrame<'a> {
    width: u32,
    height: u32,
    stride: usize,
    order: PixelOrder,
    data: &'a [u8],
}

impl<'a> CapturedFrame<'a> {
    /// Wraps `data` as a packed frame. Without a stride, rows are assumed to
    /// be tightly packed (`width * 3` bytes).
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: Option<usize>,
        order: PixelOrder,
    ) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidDimension {
                width: width as i32,
                height: height as i32,
            });
        }
        let row = width as usize * PixelOrder::CHANNELS;
        let stride = stride.unwrap_or(row).max(row);
        // The last row does not need its padding.
        let expected = stride * (height as usize - 1) + row;
        if data.len() < expected {
            return Err(CaptureError::ShortBuffer {
                expected,
                actual: data.len(),
            });
        }

        Ok(CapturedFrame {
            width,
            height,
            stride,
            order,
            data,
        })
    }

    pub fn is_tightly_packed(&self) -> bool {
        self.stride == self.width as usize * PixelOrder::CHANNELS
    }

    /// Copies the frame into an RGB image, dropping row padding and swapping
    /// channels when the source is BGR.
    pub fn to_rgb_image(&self) -> Result<RgbImage, CaptureError> {
        let row = self.width as usize * PixelOrder::CHANNELS;
        let mut pixels = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride;
            pixels.extend_from_slice(&self.data[start..start + row]);
        }

        if self.order == PixelOrder::Bgr {
            for px in pixels.chunks_exact_mut(PixelOrder::CHANNELS) {
                px.swap(0, 2);
            }
        }

        let actual = pixels.len();
        RgbImage::from_raw(self.width, self.height, pixels).ok_or(CaptureError::ShortBuffer {
            expected: row * self.height as usize,
            actual,
        })
    }
}
