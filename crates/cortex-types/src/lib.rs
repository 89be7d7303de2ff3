pub mod cancel;
pub mod model;
pub mod result;

pub use cancel::CancelToken;
pub use model::{
    ContentType, Direction, LiveStatus, MediaType, ParticipantRole, media_type_for,
};
pub use result::SyncResult;

/// Unix seconds for "now". All store timestamps use this clock.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
