//! Latest-frame publication from the plug-in's video refresh callback.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    ORgb1555,
    XRgb8888,
    Rgb565,
}

impl PixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::ORgb1555 | Self::Rgb565 => 2,
            Self::XRgb8888 => 4,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct VideoBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    pitch: usize,
    format: PixelFormat,
    has_frame: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub pitch: usize,
    pub format: PixelFormat,
}

impl VideoBuffer {
    pub fn set_format(&mut self, format: PixelFormat) {
        self.format = format;
    }

    /// Copy the frame the plug-in just rendered. A null-data refresh ("dupe
    /// frame") leaves the previous contents in place.
    pub fn publish(&mut self, data: &[u8], width: u32, height: u32, pitch: usize) {
        self.pixels.clear();
        self.pixels.extend_from_slice(data);
        self.width = width;
        self.height = height;
        self.pitch = pitch;
        self.has_frame = true;
    }

    pub fn frame(&self) -> Option<FrameView<'_>> {
        self.has_frame.then_some(FrameView {
            pixels: &self.pixels,
            width: self.width,
            height: self.height,
            pitch: self.pitch,
            format: self.format,
        })
    }
}
