use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::image_codec::{CodecConfig, EncodedImage};

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(AttendeeId);
typed_id!(WriteId);

impl WriteId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

// --- Attendee record ---

/// The profile record as stored in the `attendees` collection.
///
/// `homepage` holds the email address and `contact_info` the phone number.
/// Fields this screen does not know about are kept in `extra` and written
/// back unchanged.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub attendee_id: AttendeeId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub homepage: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub contact_info: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub profile_pic: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Attendee {
    pub fn new(
        attendee_id: AttendeeId,
        name: impl Into<String>,
        homepage: impl Into<String>,
        contact_info: impl Into<String>,
    ) -> Self {
        Self {
            attendee_id,
            name: name.into(),
            homepage: homepage.into(),
            contact_info: contact_info.into(),
            profile_pic: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_profile_pic(mut self, encoded: impl Into<String>) -> Self {
        self.profile_pic = encoded.into();
        self
    }

    pub fn has_profile_pic(&self) -> bool {
        !self.profile_pic.is_empty()
    }

    /// Overwrites the three text fields. The avatar is committed separately.
    pub fn apply_edits(&mut self, edits: &ProfileEdits) {
        self.name.clone_from(&edits.name);
        self.homepage.clone_from(&edits.homepage);
        self.contact_info.clone_from(&edits.contact_info);
    }

    /// Replaces `profile_pic` only with a non-empty pending image.
    /// Returns whether the avatar changed.
    pub fn commit_avatar(&mut self, pending: Option<&EncodedImage>) -> bool {
        match pending {
            Some(encoded) if !encoded.is_empty() => {
                self.profile_pic = encoded.as_str().to_string();
                true
            }
            _ => false,
        }
    }
}

// Redact debug output because this carries personal contact details.
impl fmt::Debug for Attendee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attendee")
            .field("attendee_id", &self.attendee_id)
            .field("name_present", &!self.name.is_empty())
            .field("homepage_present", &!self.homepage.is_empty())
            .field("contact_info_present", &!self.contact_info.is_empty())
            .field("profile_pic_len", &self.profile_pic.len())
            .field("extra_fields", &self.extra.len())
            .finish()
    }
}

// --- Form ---

/// Raw text of the three inputs, exactly as typed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl ProfileForm {
    pub fn from_attendee(attendee: &Attendee) -> Self {
        Self {
            name: attendee.name.clone(),
            email: attendee.homepage.clone(),
            phone: attendee.contact_info.clone(),
        }
    }

    pub fn trimmed(&self) -> ProfileEdits {
        ProfileEdits {
            name: self.name.trim().to_string(),
            homepage: self.email.trim().to_string(),
            contact_info: self.phone.trim().to_string(),
        }
    }
}

/// Trimmed field values ready to be written into the record. Empty strings
/// are valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileEdits {
    pub name: String,
    pub homepage: String,
    pub contact_info: String,
}

impl ProfileEdits {
    pub fn differs_from(&self, attendee: &Attendee) -> bool {
        self.name != attendee.name
            || self.homepage != attendee.homepage
            || self.contact_info != attendee.contact_info
    }
}

// --- Screen state ---

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ProfileState {
    #[default]
    Loading,
    Loaded(Box<Attendee>),
    NoProfile,
}

impl ProfileState {
    pub fn attendee(&self) -> Option<&Attendee> {
        match self {
            Self::Loaded(attendee) => Some(&**attendee),
            Self::Loading | Self::NoProfile => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum SaveState {
    #[default]
    Idle,
    /// `candidate` is the record as sent. It replaces the loaded record
    /// only once the write is confirmed.
    Saving {
        write_id: WriteId,
        candidate: Box<Attendee>,
    },
    Saved,
    Failed {
        reason: String,
    },
}

impl SaveState {
    pub fn is_saving(&self) -> bool {
        matches!(self, Self::Saving { .. })
    }

    pub fn in_flight(&self) -> Option<&WriteId> {
        match self {
            Self::Saving { write_id, .. } => Some(write_id),
            _ => None,
        }
    }
}

/// What the avatar view currently shows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AvatarPreview {
    #[default]
    Unset,
    /// The record's committed `profile_pic`, known to decode.
    Committed(EncodedImage),
    /// A freshly picked image that is not yet saved.
    Picked {
        location: Option<String>,
        encoded: EncodedImage,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            duration_ms: kind.default_duration_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info | Self::Success => crate::TOAST_SHORT_MS,
            Self::Error => crate::TOAST_LONG_MS,
        }
    }
}

#[derive(Debug, Default)]
pub struct Model {
    pub profile: ProfileState,
    pub form: ProfileForm,
    /// Base64 of a picked image awaiting save; `None` until a pick succeeds.
    pub pending_avatar: Option<EncodedImage>,
    pub avatar: AvatarPreview,
    pub picker_open: bool,
    pub save: SaveState,
    pub toast: Option<ToastMessage>,
    pub codec: CodecConfig,
}

impl Model {
    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.toast = Some(ToastMessage::new(message, kind));
    }

    pub fn clear_toast(&mut self) {
        self.toast = None;
    }

    pub fn can_save(&self) -> bool {
        self.profile.attendee().is_some() && !self.save.is_saving()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        let Some(attendee) = self.profile.attendee() else {
            return false;
        };
        self.form.trimmed().differs_from(attendee)
            || self.pending_avatar.as_ref().is_some_and(|p| !p.is_empty())
    }
}
