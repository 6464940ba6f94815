use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MAX_PICKED_SIZE_BYTES: usize = 20 * 1024 * 1024;
pub const IMAGE_MIME_FILTER: &str = "image/*";

/// Platform gallery picker. The shell shows its native picker and answers
/// with the chosen image, or `Cancelled`.
pub struct ImagePicker<E> {
    context: CapabilityContext<PickerOperation, E>,
}

impl<Ev> Capability<Ev> for ImagePicker<Ev> {
    type Operation = PickerOperation;
    type MappedSelf<MappedEv> = ImagePicker<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        ImagePicker::new(self.context.map_event(f))
    }
}

impl<E> ImagePicker<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<PickerOperation, E>) -> Self {
        Self { context }
    }

    /// Asks the shell for a single image. `callback` runs exactly once with
    /// the outcome.
    pub fn pick_image<F>(&self, config: PickConfig, callback: F)
    where
        F: FnOnce(PickerResult) -> E + Send + 'static,
    {
        let config = config.validated();
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(PickerOperation::PickImage { config })
                .await;
            context.update_app(callback(result));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PickerOperation {
    PickImage { config: PickConfig },
}

impl Operation for PickerOperation {
    type Output = PickerResult;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickConfig {
    pub mime_filter: String,
    pub max_file_size: usize,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            mime_filter: IMAGE_MIME_FILTER.to_string(),
            max_file_size: MAX_PICKED_SIZE_BYTES,
        }
    }
}

impl PickConfig {
    pub fn with_max_file_size(mut self, max_bytes: usize) -> Self {
        self.max_file_size = max_bytes.min(MAX_PICKED_SIZE_BYTES);
        self
    }

    /// Only image types may be requested.
    pub fn validated(mut self) -> Self {
        if !self.mime_filter.starts_with("image/") {
            self.mime_filter = IMAGE_MIME_FILTER.to_string();
        }
        self.max_file_size = self.max_file_size.clamp(1, MAX_PICKED_SIZE_BYTES);
        self
    }
}

/// The shell's answer to a successful pick: an opaque location handle for
/// immediate display, plus the raw encoded bytes.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickedImage {
    pub location: Option<String>,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

impl PickedImage {
    pub fn new(
        location: Option<String>,
        data: Vec<u8>,
        mime_type: Option<String>,
    ) -> Result<Self, PickerError> {
        if data.len() > MAX_PICKED_SIZE_BYTES {
            return Err(PickerError::ImageTooLarge {
                size: data.len(),
                max: MAX_PICKED_SIZE_BYTES,
            });
        }

        if let Some(loc) = &location {
            url::Url::parse(loc).map_err(|e| PickerError::InvalidImage {
                reason: format!("bad location handle: {e}"),
            })?;
        }

        Ok(Self {
            location,
            data,
            mime_type,
        })
    }

    /// "Missing data" in picker terms: nothing to decode.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The location handle, if it parses as a URI.
    pub fn display_location(&self) -> Option<&str> {
        self.location
            .as_deref()
            .filter(|loc| url::Url::parse(loc).is_ok())
    }
}

impl fmt::Debug for PickedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickedImage")
            .field("location_present", &self.location.is_some())
            .field("size", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PickerOutput {
    Picked(PickedImage),
    Cancelled,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum PickerError {
    #[error("photo library permission denied")]
    PermissionDenied,

    #[error("picker unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("pick failed: {reason}")]
    PickFailed { reason: String },

    #[error("image too large: {size} bytes exceeds maximum of {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("another pick is already in progress")]
    Busy,

    #[error("image picking not supported on this platform")]
    NotSupported,
}

impl PickerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PickerError::Busy | PickerError::Unavailable { .. })
    }
}

pub type PickerResult = Result<PickerOutput, PickerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_config_defaults_to_images() {
        let config = PickConfig::default();
        assert_eq!(config.mime_filter, "image/*");
        assert_eq!(config.max_file_size, MAX_PICKED_SIZE_BYTES);
    }

    #[test]
    fn pick_config_validation_forces_image_filter() {
        let config = PickConfig {
            mime_filter: "video/*".into(),
            max_file_size: 0,
            ..Default::default()
        }
        .validated();

        assert_eq!(config.mime_filter, "image/*");
        assert_eq!(config.max_file_size, 1);
    }

    #[test]
    fn pick_config_builder_caps_file_size() {
        let config = PickConfig::default().with_max_file_size(usize::MAX);
        assert_eq!(config.max_file_size, MAX_PICKED_SIZE_BYTES);

        let config = PickConfig::default().with_max_file_size(1024);
        assert_eq!(config.max_file_size, 1024);
    }

    #[test]
    fn picked_image_rejects_oversized_data() {
        let result = PickedImage::new(None, vec![0; MAX_PICKED_SIZE_BYTES + 1], None);
        assert!(matches!(result, Err(PickerError::ImageTooLarge { .. })));
    }

    #[test]
    fn picked_image_rejects_bad_location() {
        let result = PickedImage::new(Some("not a uri".into()), vec![1, 2, 3], None);
        assert!(matches!(result, Err(PickerError::InvalidImage { .. })));
    }

    #[test]
    fn picked_image_accepts_content_uri() {
        let image = PickedImage::new(
            Some("content://media/external/images/media/42".into()),
            vec![1, 2, 3],
            Some("image/jpeg".into()),
        )
        .unwrap();
        assert_eq!(
            image.display_location(),
            Some("content://media/external/images/media/42")
        );
        assert!(!image.is_empty());
    }

    #[test]
    fn picked_image_debug_hides_bytes() {
        let image = PickedImage {
            location: Some("file:///tmp/a.png".into()),
            data: vec![0xAB; 4],
            mime_type: None,
        };
        let debug = format!("{image:?}");
        assert!(debug.contains("size: 4"));
        assert!(!debug.contains("tmp"));
    }

    #[test]
    fn picker_error_helpers() {
        assert!(!PickerError::PermissionDenied.is_retryable());
        assert!(PickerError::Busy.is_retryable());
        assert!(!PickerError::NotSupported.is_retryable());
    }
}
