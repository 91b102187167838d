use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageError, RgbaImage};
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} rgb")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("image encoding failed: {0}")]
    Image(#[from] ImageError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("artifact data is corrupt: {message}")]
    CorruptData { message: String },
    #[error("artifact format is not supported: {message}")]
    UnsupportedFormat { message: String },
}

impl From<ImageError> for DecodeError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Unsupported(_) => Self::UnsupportedFormat {
                message: err.to_string(),
            },
            _ => Self::CorruptData {
                message: err.to_string(),
            },
        }
    }
}

pub type EncodeResult<T> = std::result::Result<T, EncodeError>;
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Tightly packed 8-bit RGB pixels read back from a rendered frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> EncodeResult<Self> {
        let expected = (width as usize) * (height as usize) * RGB_CHANNELS;
        if pixels.len() != expected {
            return Err(EncodeError::BufferSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &RawFrame) -> EncodeResult<Vec<u8>>;
}

/// Turns stored artifact bytes into a displayable handle. Dropping the
/// handle frees it.
pub trait ImageDecoder: Send + Sync + 'static {
    type Output: Send + 'static;

    fn decode(&self, bytes: &[u8]) -> DecodeResult<Self::Output>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PngCodec;

impl FrameEncoder for PngCodec {
    fn encode(&self, frame: &RawFrame) -> EncodeResult<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        PngEncoder::new(&mut bytes).write_image(
            frame.pixels(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(bytes.into_inner())
    }
}

/// Decoded RGBA pixels ready to upload to a display surface.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: RgbaImage,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(image: DynamicImage) -> Self {
        Self {
            image: image.into_rgba8(),
        }
    }
}

/// Full-resolution decode used by the viewer.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullImageDecoder;

impl ImageDecoder for FullImageDecoder {
    type Output = DecodedImage;

    fn decode(&self, bytes: &[u8]) -> DecodeResult<DecodedImage> {
        Ok(image::load_from_memory(bytes)?.into())
    }
}

/// Decodes and shrinks to fit a `max_edge` square, keeping aspect ratio.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailDecoder {
    max_edge: u32,
}

impl ThumbnailDecoder {
    pub fn new(max_edge: u32) -> Self {
        Self {
            max_edge: max_edge.max(1),
        }
    }
}

impl ImageDecoder for ThumbnailDecoder {
    type Output = DecodedImage;

    fn decode(&self, bytes: &[u8]) -> DecodeResult<DecodedImage> {
        let image = image::load_from_memory(bytes)?;
        if image.width() <= self.max_edge && image.height() <= self.max_edge {
            return Ok(image.into());
        }
        Ok(image.thumbnail(self.max_edge, self.max_edge).into())
    }
}

#[cfg(test)]
pub(crate) fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> RawFrame {
    let pixels = rgb
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * RGB_CHANNELS)
        .collect();
    RawFrame::new(width, height, pixels).expect("solid frame dimensions are consistent")
}
