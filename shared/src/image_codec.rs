//! Avatar image codec.
//!
//! Avatars are stored on the attendee record as base64 text of a PNG
//! container. `encode` and `decode` are the only two ways in and out of that
//! textual form; `reencode` turns whatever the picker hands back (PNG, JPEG,
//! WebP) into the same form.

use std::fmt;
use std::io::Cursor;

use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const PNG_MIME_TYPE: &str = "image/png";

/// Accepts padded and unpadded input. Older clients wrote padded base64
/// with a line break every 76 characters; whitespace is stripped first.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encoded payload is empty")]
    EmptyInput,

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("invalid base64 payload: {source}")]
    Base64 {
        #[from]
        source: base64::DecodeError,
    },

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("failed to decode image: {source}")]
    Decode { source: image::ImageError },

    #[error("png encoding failed: width={width}, height={height}, reason={reason}")]
    Encode {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("image too large: {width}x{height}, max {max}x{max}")]
    DimensionsTooLarge { width: u32, height: u32, max: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    /// Upper bound on the base64 text accepted by `decode`.
    pub max_encoded_len: usize,
    /// Upper bound on raw picked bytes accepted by `reencode`.
    pub max_input_bytes: usize,
    pub max_dimension: u32,
    pub max_alloc_bytes: u64,
    /// Picked images larger than this on either side are scaled down
    /// (aspect preserved) before encoding.
    pub avatar_max_dimension: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_encoded_len: crate::MAX_ENCODED_AVATAR_LEN,
            max_input_bytes: crate::MAX_PICKED_IMAGE_BYTES,
            max_dimension: crate::MAX_IMAGE_DIMENSION,
            max_alloc_bytes: crate::MAX_IMAGE_ALLOC,
            avatar_max_dimension: crate::AVATAR_MAX_DIMENSION,
        }
    }
}

/// Base64 text of a PNG-compressed image buffer.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// Payloads run to hundreds of kilobytes; keep them out of logs.
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Serializes `img` losslessly as PNG and base64-encodes the bytes.
pub fn encode(img: &DynamicImage) -> Result<EncodedImage, CodecError> {
    let png = encode_png(img)?;
    Ok(EncodedImage(STANDARD.encode(png)))
}

/// Inverse of [`encode`] with default limits. Malformed base64 or a payload
/// that is not an image yields `None`.
pub fn decode(encoded: &str) -> Option<DynamicImage> {
    decode_with(&CodecConfig::default(), encoded)
}

pub fn decode_with(config: &CodecConfig, encoded: &str) -> Option<DynamicImage> {
    match try_decode(config, encoded) {
        Ok(img) => Some(img),
        Err(e) => {
            debug!(error = %e, "avatar payload did not decode");
            None
        }
    }
}

#[instrument(skip(config, encoded), fields(encoded_len = encoded.len()))]
pub fn try_decode(config: &CodecConfig, encoded: &str) -> Result<DynamicImage, CodecError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    if compact.is_empty() {
        return Err(CodecError::EmptyInput);
    }

    if compact.len() > config.max_encoded_len {
        return Err(CodecError::InputTooLarge {
            size: compact.len(),
            max_size: config.max_encoded_len,
        });
    }

    let bytes = LENIENT.decode(compact.as_bytes())?;
    decode_image_bytes(config, &bytes, Some(ImageFormat::Png))
}

/// Decodes raw picked bytes into a bitmap, scales it down to the avatar
/// bound if needed, and re-encodes it in the stored form.
///
/// `mime_type` is the picker's claim about the bytes. It is only used when
/// the format cannot be sniffed. A result longer than `max_encoded_len` is
/// refused.
#[instrument(skip(config, raw_bytes), fields(input_size = raw_bytes.len()))]
pub fn reencode(
    config: &CodecConfig,
    raw_bytes: &[u8],
    mime_type: Option<&str>,
) -> Result<EncodedImage, CodecError> {
    if raw_bytes.is_empty() {
        return Err(CodecError::EmptyInput);
    }

    if raw_bytes.len() > config.max_input_bytes {
        return Err(CodecError::InputTooLarge {
            size: raw_bytes.len(),
            max_size: config.max_input_bytes,
        });
    }

    let hint = mime_type.and_then(ImageFormat::from_mime_type);
    let img = decode_image_bytes(config, raw_bytes, hint)?;
    let (w, h) = img.dimensions();
    let bound = config.avatar_max_dimension.max(1);

    let img = if w > bound || h > bound {
        debug!(width = w, height = h, bound, "scaling picked avatar down");
        img.resize(bound, bound, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    let encoded = encode(&img).map_err(|e| {
        warn!(error = %e, "re-encoding picked avatar failed");
        e
    })?;

    if encoded.len() > config.max_encoded_len {
        return Err(CodecError::InputTooLarge {
            size: encoded.len(),
            max_size: config.max_encoded_len,
        });
    }

    Ok(encoded)
}

fn decode_image_bytes(
    config: &CodecConfig,
    raw_bytes: &[u8],
    hint: Option<ImageFormat>,
) -> Result<DynamicImage, CodecError> {
    if raw_bytes.is_empty() {
        return Err(CodecError::EmptyInput);
    }

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| CodecError::Decode { source: e.into() })?;

    if reader.format().is_none() {
        match hint {
            Some(format) => reader.set_format(format),
            None => return Err(CodecError::UnsupportedFormat),
        }
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);
    reader.limits(limits);

    let img = reader
        .decode()
        .map_err(|source| CodecError::Decode { source })?;

    let (w, h) = img.dimensions();
    if w > config.max_dimension || h > config.max_dimension {
        return Err(CodecError::DimensionsTooLarge {
            width: w,
            height: h,
            max: config.max_dimension,
        });
    }

    Ok(img)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let (width, height) = img.dimensions();

    if width == 0 || height == 0 {
        return Err(CodecError::Encode {
            width,
            height,
            reason: "zero dimension".into(),
        });
    }

    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| CodecError::Encode {
            width,
            height,
            reason: e.to_string(),
        })?;

    Ok(buffer)
}
