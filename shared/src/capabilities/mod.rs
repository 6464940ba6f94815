//! Capabilities the profile screen needs from its shell.
//!
//! Render is Crux's built-in capability; the picker and the document store
//! are ours.

mod document_store;
mod picker;

pub use self::document_store::{
    BackendErrorCode, CollectionName, DocumentId, DocumentOperation, DocumentOutput,
    DocumentResult, DocumentStore, DocumentStoreError, MAX_DOCUMENT_BYTES,
};
pub use self::picker::{
    ImagePicker, PickConfig, PickedImage, PickerError, PickerOperation,
    PickerOutput, PickerResult, MAX_PICKED_SIZE_BYTES,
};
pub use crux_core::render::Render;

// The Effect derive refers to the app and event types by name.
#[allow(unused_imports)]
use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub image_picker: ImagePicker<Event>,
    pub document_store: DocumentStore<Event>,
}
