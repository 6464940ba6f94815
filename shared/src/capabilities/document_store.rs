use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MAX_ID_LENGTH: usize = 1500;
pub const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// Remote document database: insert-or-replace a document by id within a
/// named collection.
pub struct DocumentStore<E> {
    context: CapabilityContext<DocumentOperation, E>,
}

impl<Ev> Capability<Ev> for DocumentStore<Ev> {
    type Operation = DocumentOperation;
    type MappedSelf<MappedEv> = DocumentStore<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        DocumentStore::new(self.context.map_event(f))
    }
}

impl<E> DocumentStore<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<DocumentOperation, E>) -> Self {
        Self { context }
    }

    /// Sends a prepared operation to the shell. Fire-and-forget from the
    /// caller's side; `callback` turns the outcome into an event.
    pub fn send<F>(&self, operation: DocumentOperation, callback: F)
    where
        F: FnOnce(DocumentResult) -> E + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(operation).await;
            context.update_app(callback(result));
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn new(name: impl Into<String>) -> Result<Self, DocumentStoreError> {
        let name = name.into();
        validate_segment(&name).map_err(|reason| DocumentStoreError::InvalidCollection {
            name: truncate_for_error(&name),
            reason,
        })?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self, DocumentStoreError> {
        let id = id.into();
        validate_segment(&id).map_err(|reason| DocumentStoreError::InvalidDocumentId {
            id: truncate_for_error(&id),
            reason,
        })?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.trim().is_empty() {
        return Err("cannot be empty".to_string());
    }

    if segment.len() > MAX_ID_LENGTH {
        return Err(format!("exceeds maximum length of {MAX_ID_LENGTH} bytes"));
    }

    if segment.contains('/') {
        return Err("cannot contain '/'".to_string());
    }

    if segment == "." || segment == ".." {
        return Err("cannot be '.' or '..'".to_string());
    }

    if segment.chars().any(char::is_control) {
        return Err("contains control characters".to_string());
    }

    Ok(())
}

fn truncate_for_error(s: &str) -> String {
    if s.len() <= 50 {
        s.to_string()
    } else {
        s.chars().take(50).collect::<String>() + "..."
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentOperation {
    /// Full-document write: the stored document becomes exactly `document`.
    Upsert {
        collection: CollectionName,
        document_id: DocumentId,
        #[serde(with = "serde_bytes")]
        document: Vec<u8>,
    },
}

impl DocumentOperation {
    /// Serializes `document` as JSON and checks it against the backend's
    /// per-document size cap.
    pub fn upsert<T: Serialize>(
        collection: CollectionName,
        document_id: DocumentId,
        document: &T,
    ) -> Result<Self, DocumentStoreError> {
        let document = serde_json::to_vec(document).map_err(|e| {
            DocumentStoreError::Serialization {
                message: e.to_string(),
            }
        })?;

        if document.len() > MAX_DOCUMENT_BYTES {
            return Err(DocumentStoreError::DocumentTooLarge {
                size: document.len(),
                max: MAX_DOCUMENT_BYTES,
            });
        }

        Ok(Self::Upsert {
            collection,
            document_id,
            document,
        })
    }

    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Upsert { document_id, .. } => document_id,
        }
    }

    pub fn collection(&self) -> &CollectionName {
        match self {
            Self::Upsert { collection, .. } => collection,
        }
    }

    pub fn document_bytes(&self) -> &[u8] {
        match self {
            Self::Upsert { document, .. } => document,
        }
    }
}

impl fmt::Debug for DocumentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upsert {
                collection,
                document_id,
                document,
            } => f
                .debug_struct("Upsert")
                .field("collection", collection)
                .field("document_id", document_id)
                .field("document_bytes", &document.len())
                .finish(),
        }
    }
}

impl Operation for DocumentOperation {
    type Output = DocumentResult;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentOutput {
    Written,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentStoreError {
    #[error("invalid collection '{name}': {reason}")]
    InvalidCollection { name: String, reason: String },

    #[error("invalid document id '{id}': {reason}")]
    InvalidDocumentId { id: String, reason: String },

    #[error("document too large: {size} bytes exceeds maximum of {max} bytes")]
    DocumentTooLarge { size: usize, max: usize },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("operation timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("backend error: {message} (code: {code:?}, retryable: {retryable})")]
    Backend {
        code: BackendErrorCode,
        message: String,
        retryable: bool,
    },
}

impl DocumentStoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DocumentStoreError::Backend { retryable, .. } => *retryable,
            DocumentStoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn backend(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendErrorCode {
    Unknown,
    Unavailable,
    Unauthenticated,
    ResourceExhausted,
    Aborted,
    Internal,
}

impl BackendErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendErrorCode::Unavailable
                | BackendErrorCode::ResourceExhausted
                | BackendErrorCode::Aborted
        )
    }
}

pub type DocumentResult = Result<DocumentOutput, DocumentStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Doc {
        name: String,
    }

    #[test]
    fn document_id_rejects_empty_and_whitespace() {
        assert!(DocumentId::new("").is_err());
        assert!(DocumentId::new("   ").is_err());
    }

    #[test]
    fn document_id_rejects_path_separators() {
        let result = DocumentId::new("a/b");
        assert!(matches!(result, Err(DocumentStoreError::InvalidDocumentId { .. })));
        assert!(DocumentId::new("..").is_err());
    }

    #[test]
    fn document_id_rejects_control_chars() {
        assert!(DocumentId::new("abc\0def").is_err());
        assert!(DocumentId::new("abc\ndef").is_err());
    }

    #[test]
    fn document_id_rejects_too_long() {
        let result = DocumentId::new("a".repeat(MAX_ID_LENGTH + 1));
        match result {
            Err(DocumentStoreError::InvalidDocumentId { id, .. }) => assert!(id.ends_with("...")),
            other => panic!("expected InvalidDocumentId, got {other:?}"),
        }
    }

    #[test]
    fn document_id_accepts_typical_ids() {
        assert_eq!(DocumentId::new("u-123_abc").unwrap().as_str(), "u-123_abc");
        assert!(DocumentId::new("3f1c9a7e-5b2d-4e8a-9c1f-0a2b3c4d5e6f").is_ok());
    }

    #[test]
    fn collection_name_validation() {
        assert!(CollectionName::new("attendees").is_ok());
        assert!(matches!(
            CollectionName::new(""),
            Err(DocumentStoreError::InvalidCollection { .. })
        ));
    }

    #[test]
    fn upsert_serializes_document_as_json() {
        let op = DocumentOperation::upsert(
            CollectionName::new("attendees").unwrap(),
            DocumentId::new("a1").unwrap(),
            &Doc { name: "Ann".into() },
        )
        .unwrap();

        assert_eq!(op.collection().as_str(), "attendees");
        assert_eq!(op.document_id().as_str(), "a1");
        assert_eq!(op.document_bytes(), br#"{"name":"Ann"}"#);
    }

    #[test]
    fn upsert_rejects_oversized_documents() {
        let result = DocumentOperation::upsert(
            CollectionName::new("attendees").unwrap(),
            DocumentId::new("a1").unwrap(),
            &Doc {
                name: "x".repeat(MAX_DOCUMENT_BYTES),
            },
        );
        assert!(matches!(result, Err(DocumentStoreError::DocumentTooLarge { .. })));
    }

    #[test]
    fn operation_debug_omits_document_body() {
        let op = DocumentOperation::upsert(
            CollectionName::new("attendees").unwrap(),
            DocumentId::new("a1").unwrap(),
            &Doc {
                name: "private".into(),
            },
        )
        .unwrap();
        let debug = format!("{op:?}");
        assert!(!debug.contains("private"));
        assert!(debug.contains("document_bytes"));
    }

    #[test]
    fn error_retryable() {
        assert!(DocumentStoreError::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(DocumentStoreError::backend(BackendErrorCode::Unavailable, "down").is_retryable());
        assert!(!DocumentStoreError::backend(BackendErrorCode::Internal, "bad").is_retryable());
        assert!(!DocumentStoreError::PermissionDenied {
            message: "rules".into()
        }
        .is_retryable());
    }
}
