use std::fmt;
use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Largest image, in raw bytes, accepted as an attachment (5 MiB).
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Image media types accepted as attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMediaType {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Heic,
    Heif,
    Tiff,
    Svg,
}

impl ImageMediaType {
    /// Guesses the media type from a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" => Some(ImageMediaType::Jpeg),
            "png" => Some(ImageMediaType::Png),
            "gif" => Some(ImageMediaType::Gif),
            "webp" => Some(ImageMediaType::Webp),
            "bmp" => Some(ImageMediaType::Bmp),
            "heic" => Some(ImageMediaType::Heic),
            "heif" => Some(ImageMediaType::Heif),
            "tif" | "tiff" => Some(ImageMediaType::Tiff),
            "svg" => Some(ImageMediaType::Svg),
            _ => None,
        }
    }

    /// Parses a MIME type such as `image/png`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageMediaType::Jpeg),
            "image/png" => Some(ImageMediaType::Png),
            "image/gif" => Some(ImageMediaType::Gif),
            "image/webp" => Some(ImageMediaType::Webp),
            "image/bmp" => Some(ImageMediaType::Bmp),
            "image/heic" => Some(ImageMediaType::Heic),
            "image/heif" => Some(ImageMediaType::Heif),
            "image/tiff" => Some(ImageMediaType::Tiff),
            "image/svg+xml" => Some(ImageMediaType::Svg),
            _ => None,
        }
    }

    /// The MIME type string.
    pub fn as_mime(&self) -> &'static str {
        match self {
            ImageMediaType::Jpeg => "image/jpeg",
            ImageMediaType::Png => "image/png",
            ImageMediaType::Gif => "image/gif",
            ImageMediaType::Webp => "image/webp",
            ImageMediaType::Bmp => "image/bmp",
            ImageMediaType::Heic => "image/heic",
            ImageMediaType::Heif => "image/heif",
            ImageMediaType::Tiff => "image/tiff",
            ImageMediaType::Svg => "image/svg+xml",
        }
    }
}

impl fmt::Display for ImageMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// A single image staged for the next turn, held base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// Name shown in place of a thumbnail.
    pub file_name: String,
    /// Media type detected from the file name or data URI.
    pub media_type: ImageMediaType,
    /// Size of the raw image in bytes.
    pub size: u64,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl ImageAttachment {
    /// Loads an image from disk.
    ///
    /// The size cap is checked against file metadata before the file is read,
    /// so an oversized image is never loaded into memory.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image")
            .to_string();
        let media_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageMediaType::from_extension)
            .ok_or_else(|| {
                Error::validation(
                    format!("{} is not a recognized image file", path.display()),
                    Some("image".to_string()),
                )
            })?;

        let metadata = fs::metadata(path)
            .map_err(|err| Error::io(format!("cannot stat {}", path.display()), err))?;
        check_size(metadata.len())?;

        let bytes =
            fs::read(path).map_err(|err| Error::io(format!("cannot read {}", path.display()), err))?;
        Self::from_bytes(file_name, media_type, &bytes)
    }

    /// Builds an attachment from raw image bytes.
    pub fn from_bytes(
        file_name: impl Into<String>,
        media_type: ImageMediaType,
        bytes: &[u8],
    ) -> Result<Self> {
        let size = bytes.len() as u64;
        check_size(size)?;
        Ok(Self {
            file_name: file_name.into(),
            media_type,
            size,
            data: STANDARD.encode(bytes),
        })
    }

    /// Parses a `data:<mime>;base64,<payload>` URI.
    pub fn from_data_uri(file_name: impl Into<String>, uri: &str) -> Result<Self> {
        let malformed = || Error::validation("malformed data URI", Some("image".to_string()));
        let rest = uri.strip_prefix("data:").ok_or_else(malformed)?;
        let (header, payload) = rest.split_once(',').ok_or_else(malformed)?;
        let mime = header.strip_suffix(";base64").ok_or_else(malformed)?;
        let media_type = ImageMediaType::from_mime(mime).ok_or_else(|| {
            Error::validation(
                format!("{mime} is not an image type"),
                Some("image".to_string()),
            )
        })?;
        let bytes = STANDARD.decode(payload).map_err(|err| {
            Error::encoding(
                format!("invalid base64 in data URI: {err}"),
                Some(Box::new(err)),
            )
        })?;
        Self::from_bytes(file_name, media_type, &bytes)
    }

    /// Renders the attachment as a data URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type.as_mime(), self.data)
    }
}

fn check_size(size: u64) -> Result<()> {
    if size > MAX_IMAGE_BYTES {
        crate::observability::ATTACHMENTS_REJECTED.click();
        tracing::warn!(size, limit = MAX_IMAGE_BYTES, "rejecting oversized image");
        Err(Error::attachment_too_large(size, MAX_IMAGE_BYTES))
    } else {
        Ok(())
    }
}
