use serde::{Deserialize, Serialize};

/// Direction of a communication act relative to the store owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
    Observed,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
            Direction::Observed => "observed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Direction::Sent),
            "received" => Some(Direction::Received),
            "observed" => Some(Direction::Observed),
            _ => None,
        }
    }
}

/// Closed vocabulary for the `content_types` set on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Attachment,
    Reaction,
    Membership,
    CalendarEvent,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Attachment => "attachment",
            ContentType::Reaction => "reaction",
            ContentType::Membership => "membership",
            ContentType::CalendarEvent => "calendar_event",
        }
    }

    /// Encode a set of content types as the small JSON array stored on the row.
    pub fn encode(types: &[ContentType]) -> String {
        let tags: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Role a contact plays in an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Sender,
    Recipient,
    Cc,
    Member,
    Organizer,
    Attendee,
    Observer,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Sender => "sender",
            ParticipantRole::Recipient => "recipient",
            ParticipantRole::Cc => "cc",
            ParticipantRole::Member => "member",
            ParticipantRole::Organizer => "organizer",
            ParticipantRole::Attendee => "attendee",
            ParticipantRole::Observer => "observer",
        }
    }
}

/// Live watcher status stored under the reserved adapter-state keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    Running,
    Error,
    Stopped,
}

impl LiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveStatus::Running => "running",
            LiveStatus::Error => "error",
            LiveStatus::Stopped => "stopped",
        }
    }
}

/// Media classification for attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Sticker,
    Document,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Sticker => "sticker",
            MediaType::Document => "document",
        }
    }
}

/// Derive a media type from a mime type plus the upstream sticker flag.
/// The sticker flag always wins.
pub fn media_type_for(mime_type: &str, is_sticker: bool) -> MediaType {
    if is_sticker {
        return MediaType::Sticker;
    }
    let mime = mime_type.trim().to_ascii_lowercase();
    if mime.starts_with("image/") {
        MediaType::Image
    } else if mime.starts_with("video/") {
        MediaType::Video
    } else if mime.starts_with("audio/") {
        MediaType::Audio
    } else {
        MediaType::Document
    }
}
