use serde::{Deserialize, Serialize};

use crate::capabilities::{DocumentResult, PickerResult};
use crate::model::{Attendee, WriteId};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    /// The shell opened the screen with the session's active attendee, if
    /// any.
    ScreenOpened {
        attendee: Option<Box<Attendee>>,
    },

    // Form
    NameChanged(String),
    EmailChanged(String),
    PhoneChanged(String),
    DiscardChanges,

    // User actions
    PickAvatarRequested,
    SaveRequested,
    ToastDismissed,

    // Capability responses (boxed to keep enum size small)
    #[serde(skip)]
    AvatarPicked(Box<PickerResult>),
    #[serde(skip)]
    ProfileWritten {
        write_id: WriteId,
        result: Box<DocumentResult>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ScreenOpened { .. } => "screen_opened",
            Self::NameChanged(_) => "name_changed",
            Self::EmailChanged(_) => "email_changed",
            Self::PhoneChanged(_) => "phone_changed",
            Self::DiscardChanges => "discard_changes",
            Self::PickAvatarRequested => "pick_avatar_requested",
            Self::SaveRequested => "save_requested",
            Self::ToastDismissed => "toast_dismissed",
            Self::AvatarPicked(_) => "avatar_picked",
            Self::ProfileWritten { .. } => "profile_written",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        !matches!(self, Self::AvatarPicked(_) | Self::ProfileWritten { .. })
    }
}
