//! Row types for the store. Optional columns are `Option<T>` and bind as
//! SQL NULL; none of them use sentinel empty strings.

#[derive(Debug, Clone, serde::Serialize)]
pub struct EventRecord {
    pub id: String,
    pub timestamp: i64,
    pub channel: String,
    /// JSON array drawn from the closed content-type set, e.g. `["text"]`.
    pub content_types: String,
    pub content: String,
    pub direction: String,
    pub thread_id: Option<String>,
    pub reply_to: Option<String>,
    pub source_adapter: String,
    pub source_id: String,
    pub metadata_json: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ThreadRecord {
    pub id: String,
    pub channel: String,
    pub name: Option<String>,
    pub source_adapter: String,
    pub source_id: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ContactRecord {
    pub id: String,
    pub display_name: Option<String>,
    pub source: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ContactIdentifierRecord {
    pub id: String,
    pub contact_id: String,
    pub identifier_type: String,
    pub raw: String,
    pub normalized: String,
    pub first_seen: i64,
    pub last_seen: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PersonRecord {
    pub id: String,
    pub canonical_name: String,
    pub display_name: Option<String>,
    pub is_me: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PersonContactLinkRecord {
    pub person_id: String,
    pub contact_id: String,
    pub confidence: f64,
    pub source_type: String,
    pub first_seen: i64,
    pub last_seen: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AttachmentRecord {
    pub id: String,
    pub event_id: String,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub media_type: String,
    pub storage_uri: Option<String>,
    pub storage_type: Option<String>,
    pub content_hash: Option<String>,
    pub source_id: Option<String>,
    pub metadata_json: Option<String>,
}

/// Per-event mutable state mirrored from upstream labels (Gmail).
#[derive(Debug, Clone, serde::Serialize)]
pub struct EventStateRecord {
    pub event_id: String,
    pub read_state: String,
    pub flagged: bool,
    pub archived: bool,
    pub status: String,
}

/// Per-adapter cursor. `last_sync_at` is monotonic in the source's native
/// time units; its exact meaning is adapter-defined.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Watermark {
    pub last_sync_at: i64,
    pub last_event_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncJobRecord {
    pub adapter: String,
    pub status: String,
    pub phase: Option<String>,
    pub cursor: Option<String>,
    pub started_at: i64,
    pub updated_at: i64,
    pub last_error: Option<String>,
    pub progress_json: Option<String>,
}
