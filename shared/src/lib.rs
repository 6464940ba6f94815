// lib.rs - Attendee profile editor core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]

pub mod capabilities;
pub mod event;
pub mod image_codec;
pub mod model;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use event::Event;
pub use model::{
    Attendee, AttendeeId, AvatarPreview, Model, ProfileForm, ProfileState, SaveState,
    ToastKind, ToastMessage, WriteId,
};

pub const ATTENDEES_COLLECTION: &str = "attendees";
pub const SAVE_SUCCESS_MESSAGE: &str = "Profile updated successfully!";
pub const SAVING_STATUS_TEXT: &str = "Saving…";
pub const TOAST_SHORT_MS: u64 = 2000;
pub const TOAST_LONG_MS: u64 = 3500;
pub const MAX_ENCODED_AVATAR_LEN: usize = 1024 * 1024;
pub const MAX_PICKED_IMAGE_BYTES: usize = 20 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 8192;
pub const MAX_IMAGE_ALLOC: u64 = 256 * 1024 * 1024;
pub const AVATAR_MAX_DIMENSION: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Timeout,
    Unavailable,
    PermissionDenied,
    Validation,
    DocumentTooLarge,
    Serialization,
    ImageProcessing,
    ImageTooLarge,
    ImageFormatUnsupported,
    Picker,
    PickerPermissionDenied,
    NoProfile,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::Unavailable => "UNAVAILABLE",
            Self::PermissionDenied => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::DocumentTooLarge => "DOCUMENT_TOO_LARGE",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::ImageProcessing => "IMAGE_PROCESSING_ERROR",
            Self::ImageTooLarge => "IMAGE_TOO_LARGE",
            Self::ImageFormatUnsupported => "IMAGE_FORMAT_UNSUPPORTED",
            Self::Picker => "PICKER_ERROR",
            Self::PickerPermissionDenied => "PICKER_PERMISSION_DENIED",
            Self::NoProfile => "NO_PROFILE",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Timeout | Self::Unavailable | Self::Picker => ErrorSeverity::Transient,

            Self::Serialization | Self::Internal => ErrorSeverity::Fatal,

            Self::PermissionDenied
            | Self::Validation
            | Self::DocumentTooLarge
            | Self::ImageProcessing
            | Self::ImageTooLarge
            | Self::ImageFormatUnsupported
            | Self::PickerPermissionDenied
            | Self::NoProfile
            | Self::Unknown => ErrorSeverity::Permanent,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable | Self::Picker)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Timeout => "Saving took too long. Please try again.".into(),
            ErrorKind::Unavailable => {
                "Unable to reach the server. Please check your connection and try again.".into()
            }
            ErrorKind::PermissionDenied => {
                "You don't have permission to update this profile.".into()
            }
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::DocumentTooLarge => {
                "Your profile is too large to save. Please choose a smaller picture.".into()
            }
            ErrorKind::Serialization => {
                "A data error occurred. Please contact support if this persists.".into()
            }
            ErrorKind::ImageProcessing => {
                "Unable to process the image. Please try a different picture.".into()
            }
            ErrorKind::ImageTooLarge => {
                format!(
                    "The image is too large. Please use an image smaller than {} MB.",
                    MAX_PICKED_IMAGE_BYTES / (1024 * 1024)
                )
            }
            ErrorKind::ImageFormatUnsupported => {
                "This image format is not supported. Please use JPEG, PNG, or WebP.".into()
            }
            ErrorKind::Picker => "Couldn't open your photos. Please try again.".into(),
            ErrorKind::PickerPermissionDenied => {
                "Photo access is required. Please enable it in Settings.".into()
            }
            ErrorKind::NoProfile => "No profile is loaded, so there is nothing to save.".into(),
            ErrorKind::Internal | ErrorKind::Unknown => {
                "Couldn't update your profile. Please try again.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<capabilities::DocumentStoreError> for AppError {
    fn from(e: capabilities::DocumentStoreError) -> Self {
        use capabilities::{BackendErrorCode, DocumentStoreError};

        let kind = match &e {
            DocumentStoreError::InvalidCollection { .. }
            | DocumentStoreError::InvalidDocumentId { .. } => ErrorKind::Validation,
            DocumentStoreError::DocumentTooLarge { .. } => ErrorKind::DocumentTooLarge,
            DocumentStoreError::Serialization { .. } => ErrorKind::Serialization,
            DocumentStoreError::PermissionDenied { .. }
            | DocumentStoreError::Backend {
                code: BackendErrorCode::Unauthenticated,
                ..
            } => ErrorKind::PermissionDenied,
            DocumentStoreError::Timeout { .. } => ErrorKind::Timeout,
            DocumentStoreError::Backend { .. } if e.is_retryable() => ErrorKind::Unavailable,
            DocumentStoreError::Backend {
                code: BackendErrorCode::Internal,
                ..
            } => ErrorKind::Internal,
            DocumentStoreError::Backend { .. } => ErrorKind::Unknown,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<capabilities::PickerError> for AppError {
    fn from(e: capabilities::PickerError) -> Self {
        use capabilities::PickerError;

        let kind = match &e {
            PickerError::PermissionDenied => ErrorKind::PickerPermissionDenied,
            PickerError::ImageTooLarge { .. } => ErrorKind::ImageTooLarge,
            PickerError::InvalidImage { .. } => ErrorKind::ImageProcessing,
            PickerError::Unavailable { .. }
            | PickerError::PickFailed { .. }
            | PickerError::Busy
            | PickerError::NotSupported => ErrorKind::Picker,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<image_codec::CodecError> for AppError {
    fn from(e: image_codec::CodecError) -> Self {
        use image_codec::CodecError;

        let kind = match &e {
            CodecError::InputTooLarge { .. } | CodecError::DimensionsTooLarge { .. } => {
                ErrorKind::ImageTooLarge
            }
            CodecError::UnsupportedFormat => ErrorKind::ImageFormatUnsupported,
            CodecError::EmptyInput
            | CodecError::Base64 { .. }
            | CodecError::Decode { .. }
            | CodecError::Encode { .. } => ErrorKind::ImageProcessing,
        };
        AppError::new(kind, e.to_string())
    }
}

// --- View model ---

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScreenState {
    Loading,
    Editing,
    NoProfile,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AvatarView {
    /// Platform location handle of a just-picked image.
    Location { uri: String },
    Encoded { mime_type: String, base64: String },
}

impl AvatarView {
    fn from_preview(preview: &AvatarPreview) -> Option<Self> {
        let encoded = |e: &image_codec::EncodedImage| Self::Encoded {
            mime_type: image_codec::PNG_MIME_TYPE.to_string(),
            base64: e.as_str().to_string(),
        };

        match preview {
            AvatarPreview::Unset => None,
            AvatarPreview::Committed(e) => Some(encoded(e)),
            AvatarPreview::Picked {
                location: Some(uri),
                ..
            } => Some(Self::Location { uri: uri.clone() }),
            AvatarPreview::Picked {
                location: None,
                encoded: e,
            } => Some(encoded(e)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Failed { message: String },
}

impl From<&SaveState> for SaveStatus {
    fn from(state: &SaveState) -> Self {
        match state {
            SaveState::Idle => Self::Idle,
            SaveState::Saving { .. } => Self::Saving,
            SaveState::Saved => Self::Saved,
            SaveState::Failed { reason } => Self::Failed {
                message: reason.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub state: ScreenState,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub avatar: Option<AvatarView>,
    pub can_save: bool,
    pub can_pick_avatar: bool,
    pub is_saving: bool,
    pub save_status: SaveStatus,
    pub status_text: Option<String>,
    pub has_unsaved_changes: bool,
    pub toast: Option<ToastView>,
}

pub mod app {
    use super::*;
    use crate::capabilities::{
        CollectionName, DocumentId, DocumentOperation, DocumentOutput, DocumentResult,
        PickConfig, PickerOutput, PickerResult,
    };
    use crate::image_codec::{self, CodecConfig, EncodedImage};
    use tracing::{debug, info, warn};

    #[derive(Default)]
    pub struct App;

    impl App {
        fn open_screen(attendee: Option<Attendee>, model: &mut Model) {
            if !model.profile.is_loading() {
                debug!("profile screen already initialised, ignoring");
                return;
            }

            match attendee {
                Some(attendee) => {
                    info!(attendee_id = %attendee.attendee_id, "profile loaded");
                    model.form = ProfileForm::from_attendee(&attendee);
                    if !matches!(model.avatar, AvatarPreview::Picked { .. }) {
                        model.avatar = Self::committed_preview(&attendee, &model.codec);
                    }
                    model.profile = ProfileState::Loaded(Box::new(attendee));
                }
                None => {
                    info!("no active attendee, profile editing disabled");
                    model.profile = ProfileState::NoProfile;
                }
            }
        }

        /// The avatar to show for the record as persisted. A payload that
        /// does not decode leaves the avatar unset.
        fn committed_preview(attendee: &Attendee, config: &CodecConfig) -> AvatarPreview {
            if !attendee.has_profile_pic() {
                return AvatarPreview::Unset;
            }

            match image_codec::try_decode(config, &attendee.profile_pic) {
                Ok(_) => AvatarPreview::Committed(EncodedImage::new(attendee.profile_pic.clone())),
                Err(e) => {
                    warn!(
                        attendee_id = %attendee.attendee_id,
                        error = %e,
                        "stored avatar did not decode, leaving avatar unset"
                    );
                    AvatarPreview::Unset
                }
            }
        }

        fn discard_changes(model: &mut Model) {
            let Some(attendee) = model.profile.attendee() else {
                return;
            };

            model.form = ProfileForm::from_attendee(attendee);
            model.pending_avatar = None;
            model.avatar = Self::committed_preview(attendee, &model.codec);
        }

        fn handle_picked(result: PickerResult, model: &mut Model) {
            let image = match result {
                Ok(PickerOutput::Picked(image)) if !image.is_empty() => image,
                Ok(PickerOutput::Picked(_)) => {
                    debug!("picker returned no image data");
                    return;
                }
                Ok(PickerOutput::Cancelled) => {
                    debug!("avatar pick cancelled");
                    return;
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    let error = AppError::from(e);
                    warn!(code = error.code(), retryable, error = %error, "image picker failed");
                    return;
                }
            };

            match image_codec::reencode(&model.codec, &image.data, image.mime_type.as_deref()) {
                Ok(encoded) => {
                    info!(encoded_len = encoded.len(), "picked avatar encoded");
                    model.avatar = AvatarPreview::Picked {
                        location: image.display_location().map(str::to_string),
                        encoded: encoded.clone(),
                    };
                    model.pending_avatar = Some(encoded);
                }
                Err(e) => {
                    let error = AppError::from(e);
                    warn!(
                        code = error.code(),
                        error = %error,
                        "picked image could not be converted, keeping previous avatar"
                    );
                }
            }
        }

        /// Builds the record as it will look after the save, and the upsert
        /// for it. The loaded record itself is left untouched.
        fn prepare_write(
            attendee: &Attendee,
            form: &ProfileForm,
            pending: Option<&EncodedImage>,
        ) -> AppResult<(Attendee, DocumentOperation)> {
            let collection = CollectionName::new(ATTENDEES_COLLECTION)?;
            let document_id = DocumentId::new(attendee.attendee_id.as_str())?;

            let mut candidate = attendee.clone();
            candidate.apply_edits(&form.trimmed());
            let avatar_changed = candidate.commit_avatar(pending);
            debug!(avatar_changed, "profile edits applied");

            let operation = DocumentOperation::upsert(collection, document_id, &candidate)
                .map_err(|e| {
                    AppError::from(e).with_context("attendee_id", attendee.attendee_id.as_str())
                })?;

            Ok((candidate, operation))
        }

        fn save_profile(model: &mut Model, caps: &Capabilities) {
            if model.save.is_saving() {
                debug!("save already in flight, ignoring");
                return;
            }

            let Some(attendee) = model.profile.attendee() else {
                let error = AppError::new(ErrorKind::NoProfile, "save requested without a profile");
                warn!(code = error.code(), "{error}");
                model.show_toast(error.user_facing_message(), ToastKind::Error);
                return;
            };

            let attendee_id = attendee.attendee_id.clone();

            match Self::prepare_write(attendee, &model.form, model.pending_avatar.as_ref()) {
                Ok((candidate, operation)) => {
                    let write_id = WriteId::generate();
                    info!(
                        attendee_id = %attendee_id,
                        write_id = %write_id,
                        document_bytes = operation.document_bytes().len(),
                        "upserting profile"
                    );

                    model.save = SaveState::Saving {
                        write_id: write_id.clone(),
                        candidate: Box::new(candidate),
                    };
                    model.clear_toast();

                    caps.document_store.send(operation, move |result| {
                        Event::ProfileWritten {
                            write_id,
                            result: Box::new(result),
                        }
                    });
                }
                Err(error) => {
                    warn!(attendee_id = %attendee_id, code = error.code(), error = %error, "profile write not issued");
                    model.save = SaveState::Failed {
                        reason: error.user_facing_message(),
                    };
                    model.show_toast(error.user_facing_message(), ToastKind::Error);
                }
            }
        }

        fn handle_written(write_id: &WriteId, result: DocumentResult, model: &mut Model) {
            let candidate = match std::mem::take(&mut model.save) {
                SaveState::Saving {
                    write_id: in_flight,
                    candidate,
                } if in_flight == *write_id => candidate,
                other => {
                    warn!(write_id = %write_id, "dropping outcome of a write that is no longer in flight");
                    model.save = other;
                    return;
                }
            };

            match result {
                Ok(DocumentOutput::Written) => {
                    info!(write_id = %write_id, "profile document successfully updated");

                    let committed = model
                        .pending_avatar
                        .as_ref()
                        .is_some_and(|p| p.as_str() == candidate.profile_pic);
                    if committed {
                        if let Some(encoded) = model.pending_avatar.take() {
                            model.avatar = AvatarPreview::Committed(encoded);
                        }
                    }

                    model.profile = ProfileState::Loaded(candidate);
                    model.save = SaveState::Saved;
                    model.show_toast(SAVE_SUCCESS_MESSAGE, ToastKind::Success);
                }
                Err(e) => {
                    let error = AppError::from(e);
                    warn!(
                        write_id = %write_id,
                        code = error.code(),
                        retryable = error.is_retryable(),
                        error = %error,
                        "error updating profile document"
                    );
                    model.save = SaveState::Failed {
                        reason: error.user_facing_message(),
                    };
                    model.show_toast(error.user_facing_message(), ToastKind::Error);
                }
            }
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            debug!(
                event = event.name(),
                user_initiated = event.is_user_initiated(),
                "profile screen event"
            );

            match event {
                Event::ScreenOpened { attendee } => {
                    Self::open_screen(attendee.map(|a| *a), model);
                }

                Event::NameChanged(name) => model.form.name = name,
                Event::EmailChanged(email) => model.form.email = email,
                Event::PhoneChanged(phone) => model.form.phone = phone,

                Event::DiscardChanges => Self::discard_changes(model),

                Event::PickAvatarRequested => {
                    if model.picker_open {
                        debug!("picker already open, ignoring");
                        return;
                    }
                    model.picker_open = true;
                    let config = PickConfig::default().with_max_file_size(model.codec.max_input_bytes);
                    caps.image_picker.pick_image(config, |result| {
                        Event::AvatarPicked(Box::new(result))
                    });
                }

                Event::AvatarPicked(result) => {
                    model.picker_open = false;
                    Self::handle_picked(*result, model);
                }

                Event::SaveRequested => Self::save_profile(model, caps),

                Event::ProfileWritten { write_id, result } => {
                    Self::handle_written(&write_id, *result, model);
                }

                Event::ToastDismissed => model.clear_toast(),
            }

            caps.render.render();
        }

        fn view(&self, model: &Model) -> ViewModel {
            let state = match model.profile {
                ProfileState::Loading => ScreenState::Loading,
                ProfileState::Loaded(_) => ScreenState::Editing,
                ProfileState::NoProfile => ScreenState::NoProfile,
            };
            let is_saving = model.save.is_saving();

            ViewModel {
                state,
                name: model.form.name.clone(),
                email: model.form.email.clone(),
                phone: model.form.phone.clone(),
                avatar: AvatarView::from_preview(&model.avatar),
                can_save: model.can_save(),
                can_pick_avatar: !model.picker_open,
                is_saving,
                save_status: SaveStatus::from(&model.save),
                status_text: is_saving.then(|| SAVING_STATUS_TEXT.to_string()),
                has_unsaved_changes: model.has_unsaved_changes(),
                toast: model.toast.as_ref().map(ToastView::from),
            }
        }
    }
}
