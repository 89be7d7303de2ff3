pub mod db;
pub mod records;
pub mod schema;

mod queries;

pub use db::{Store, UpsertOutcome, new_row_id};
pub use queries::aix::{AixMessageRecord, AixSessionRecord, AixToolCallRecord, AixTurnRecord};
pub use queries::bus::{BusNotification, TOPIC_EVENT_CREATED, TOPIC_EVENT_UPDATED};
pub use queries::state::{LIVE_LAST_ERROR, LIVE_LAST_HEARTBEAT, LIVE_RESTARTS, LIVE_STATUS};
pub use records::{
    AttachmentRecord, ContactIdentifierRecord, ContactRecord, EventRecord, EventStateRecord,
    PersonContactLinkRecord, PersonRecord, SyncJobRecord, ThreadRecord, Watermark,
};
