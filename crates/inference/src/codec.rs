use crate::errors::CodecError;
use image::{
    ExtendedColorType, ImageEncoder, ImageError, ImageFormat, ImageReader, Limits, RgbImage,
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
};
use serde::Deserialize;
use std::io::Cursor;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 8192;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Decoded RGB8 raster (3 channels, row-major, RGB order).
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbImage,
    source_format: Option<ImageFormat>,
}

impl RasterImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels,
            source_format: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn channels(&self) -> usize {
        3
    }

    /// Container format the raster was decoded from, if any.
    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Interleaved HWC bytes.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Uploads larger than this are rejected before any parsing.
    pub max_upload_bytes: usize,
    /// Upper bound on either side of a decoded image.
    pub max_image_dimension: u32,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            output_format: OutputFormat::Jpeg,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct ImageCodec {
    config: CodecConfig,
}

impl ImageCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    #[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn decode(&self, bytes: &[u8]) -> Result<RasterImage, CodecError> {
        if bytes.len() > self.config.max_upload_bytes {
            return Err(CodecError::PayloadTooLarge(format!(
                "{} bytes exceeds the {} byte upload limit",
                bytes.len(),
                self.config.max_upload_bytes
            )));
        }

        if bytes.is_empty() {
            return Err(CodecError::UnsupportedFormat("empty payload".to_string()));
        }

        let format = image::guess_format(bytes).map_err(|_| {
            CodecError::UnsupportedFormat("unrecognised image signature".to_string())
        })?;

        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(self.limits());

        let decoded = reader
            .decode()
            .map_err(|e| classify_decode_error(format, e))?;

        let pixels = decoded.into_rgb8();
        tracing::debug!(
            format = ?format,
            width = pixels.width(),
            height = pixels.height(),
            "Decoded upload"
        );

        Ok(RasterImage {
            pixels,
            source_format: Some(format),
        })
    }

    #[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn encode(&self, image: &RasterImage) -> Result<EncodedImage, CodecError> {
        let format = self.config.output_format;
        let (width, height) = image.dimensions();
        let mut bytes = Vec::with_capacity(image.as_raw().len() / 4);

        let result = match format {
            OutputFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut bytes, self.config.jpeg_quality)
                    .encode_image(image.pixels())
            }
            OutputFormat::Png => PngEncoder::new(&mut bytes).write_image(
                image.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            ),
        };
        result.map_err(|e| CodecError::Encode(e.to_string()))?;

        Ok(EncodedImage {
            bytes,
            content_type: format.content_type(),
        })
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.config.max_image_dimension);
        limits.max_image_height = Some(self.config.max_image_dimension);
        limits
    }
}

fn classify_decode_error(format: ImageFormat, err: ImageError) -> CodecError {
    match err {
        ImageError::Limits(e) => CodecError::PayloadTooLarge(e.to_string()),
        ImageError::Unsupported(e) => {
            CodecError::UnsupportedFormat(format!("{:?}: {}", format, e))
        }
        other => CodecError::CorruptImage(format!("{:?}: {}", format, other)),
    }
}
