//! Pure per-message transforms: header extraction, MIME subject decoding,
//! base64url bodies, label-derived state.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use once_cell::sync::Lazy;
use regex::Regex;

use cortex_store::EventStateRecord;

use super::schema::{GmailHeader, GmailPart};

/// Case-insensitive header lookup.
pub fn header<'a>(headers: &'a [GmailHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

static RFC2047_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=\?([^?]+)\?([bBqQ])\?([^?]*)\?=").unwrap());

/// Decode RFC 2047 encoded words in a Subject header. Unknown charsets and
/// undecodable payloads fall back to the raw text.
pub fn decode_rfc2047(raw: &str) -> String {
    RFC2047_WORD
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let encoding = &caps[2];
            let payload = &caps[3];
            let decoded = match encoding {
                "b" | "B" => STANDARD
                    .decode(payload)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok()),
                _ => Some(decode_q_encoding(payload)),
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_q_encoding(payload: &str) -> String {
    let mut out = Vec::new();
    let bytes = payload.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'=');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Decode a base64url body payload. If decode fails, the raw string is
/// used; a single bad part never errors out the whole message.
pub fn decode_base64url(data: &str) -> String {
    URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| URL_SAFE.decode(data))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| data.to_string())
}

/// A body-part reference carrying an attachment payload.
#[derive(Debug, Clone)]
pub struct AttachmentPart {
    pub part_id: Option<String>,
    pub attachment_id: Option<String>,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
}

#[derive(Debug, Default)]
pub struct ExtractedPayload {
    pub body: Option<String>,
    pub attachments: Vec<AttachmentPart>,
}

/// Walk the MIME tree: prefer `text/plain`, fall back to any `text/*`,
/// and collect every part with a non-empty filename as an attachment.
pub fn extract_payload(root: &GmailPart) -> ExtractedPayload {
    let mut plain = None;
    let mut any_text = None;
    let mut attachments = Vec::new();
    walk(root, &mut plain, &mut any_text, &mut attachments);
    ExtractedPayload {
        body: plain.or(any_text),
        attachments,
    }
}

fn walk(
    part: &GmailPart,
    plain: &mut Option<String>,
    any_text: &mut Option<String>,
    attachments: &mut Vec<AttachmentPart>,
) {
    if let Some(filename) = part.filename.as_deref().filter(|f| !f.is_empty()) {
        attachments.push(AttachmentPart {
            part_id: part.part_id.clone(),
            attachment_id: part.body.as_ref().and_then(|b| b.attachment_id.clone()),
            filename: filename.to_string(),
            mime_type: part.mime_type.clone(),
            size: part.body.as_ref().and_then(|b| b.size),
        });
    }

    let mime = part.mime_type.as_deref().unwrap_or("");
    if mime.starts_with("text/") && part.filename.as_deref().is_none_or(str::is_empty) {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            let decoded = decode_base64url(data);
            if mime == "text/plain" {
                if plain.is_none() {
                    *plain = Some(decoded);
                }
            } else if any_text.is_none() {
                *any_text = Some(decoded);
            }
        }
    }

    for child in &part.parts {
        walk(child, plain, any_text, attachments);
    }
}

/// Derive the per-event state row from the message's labels.
pub fn state_from_labels(event_id: &str, labels: &[String]) -> EventStateRecord {
    let has = |l: &str| labels.iter().any(|x| x == l);
    let status = if has("DRAFT") {
        "draft"
    } else if has("SENT") {
        "sent"
    } else {
        "received"
    };
    EventStateRecord {
        event_id: event_id.to_string(),
        read_state: if has("UNREAD") { "unread" } else { "read" }.to_string(),
        flagged: has("STARRED") || has("IMPORTANT"),
        archived: !has("INBOX"),
        status: status.to_string(),
    }
}

/// Split an address-list header into `(display_name, email)` pairs.
/// Handles `Name <a@x>`, bare addresses, and quoted names.
pub fn parse_address_list(raw: &str) -> Vec<(Option<String>, String)> {
    let mut out = Vec::new();
    for part in split_addresses(raw) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let (Some(lt), Some(gt)) = (part.find('<'), part.rfind('>')) {
            if lt < gt {
                let email = part[lt + 1..gt].trim().to_string();
                let name = part[..lt].trim().trim_matches('"').trim().to_string();
                if !email.is_empty() {
                    out.push(((!name.is_empty()).then_some(name), email));
                }
            }
        } else if part.contains('@') {
            out.push((None, part.to_string()));
        }
    }
    out
}

fn split_addresses(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

/// Gmail `internalDate` is epoch milliseconds as a string.
pub fn message_timestamp(internal_date: Option<&str>) -> Option<i64> {
    internal_date?.parse::<i64>().ok().map(|ms| ms / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_part(mime: &str, data: &str) -> GmailPart {
        GmailPart {
            mime_type: Some(mime.to_string()),
            body: Some(super::super::schema::GmailBody {
                data: Some(URL_SAFE_NO_PAD.encode(data)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let headers = vec![GmailHeader {
            name: "SUBJECT".to_string(),
            value: "hello".to_string(),
        }];
        assert_eq!(header(&headers, "Subject"), Some("hello"));
        assert_eq!(header(&headers, "From"), None);
    }

    #[test]
    fn test_rfc2047_base64_subject() {
        assert_eq!(decode_rfc2047("=?utf-8?B?aGVsbG8gd29ybGQ=?="), "hello world");
    }

    #[test]
    fn test_rfc2047_q_encoding() {
        assert_eq!(decode_rfc2047("=?utf-8?Q?caf=C3=A9_time?="), "café time");
    }

    #[test]
    fn test_rfc2047_passthrough_on_plain_subject() {
        assert_eq!(decode_rfc2047("plain subject"), "plain subject");
    }

    #[test]
    fn test_base64url_fallback_to_raw() {
        assert_eq!(decode_base64url("aGk"), "hi");
        assert_eq!(decode_base64url("%%not-base64%%"), "%%not-base64%%");
    }

    #[test]
    fn test_extract_prefers_text_plain() {
        let root = GmailPart {
            mime_type: Some("multipart/alternative".to_string()),
            parts: vec![
                text_part("text/html", "<b>hi</b>"),
                text_part("text/plain", "hi"),
            ],
            ..Default::default()
        };
        let payload = extract_payload(&root);
        assert_eq!(payload.body.as_deref(), Some("hi"));
        assert!(payload.attachments.is_empty());
    }

    #[test]
    fn test_extract_collects_attachments() {
        let mut attachment = GmailPart {
            mime_type: Some("image/png".to_string()),
            filename: Some("pic.png".to_string()),
            ..Default::default()
        };
        attachment.body = Some(super::super::schema::GmailBody {
            attachment_id: Some("att-1".to_string()),
            size: Some(2048),
            data: None,
        });
        let root = GmailPart {
            mime_type: Some("multipart/mixed".to_string()),
            parts: vec![text_part("text/plain", "see attached"), attachment],
            ..Default::default()
        };
        let payload = extract_payload(&root);
        assert_eq!(payload.body.as_deref(), Some("see attached"));
        assert_eq!(payload.attachments.len(), 1);
        assert_eq!(payload.attachments[0].filename, "pic.png");
        assert_eq!(payload.attachments[0].attachment_id.as_deref(), Some("att-1"));
    }

    #[test]
    fn test_state_from_labels() {
        let labels: Vec<String> = ["UNREAD", "INBOX", "STARRED"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let state = state_from_labels("gmail:m1", &labels);
        assert_eq!(state.read_state, "unread");
        assert!(state.flagged);
        assert!(!state.archived);
        assert_eq!(state.status, "received");

        let sent = state_from_labels("gmail:m2", &["SENT".to_string()]);
        assert_eq!(sent.status, "sent");
        assert!(sent.archived);
        assert_eq!(sent.read_state, "read");
    }

    #[test]
    fn test_parse_address_list() {
        let parsed = parse_address_list(
            r#""Lovelace, Ada" <ada@example.com>, bob@example.com, Carol <carol@x.org>"#,
        );
        assert_eq!(parsed.len(), 3);
        assert_eq!(
            parsed[0],
            (
                Some("Lovelace, Ada".to_string()),
                "ada@example.com".to_string()
            )
        );
        assert_eq!(parsed[1], (None, "bob@example.com".to_string()));
        assert_eq!(parsed[2], (Some("Carol".to_string()), "carol@x.org".to_string()));
    }

    #[test]
    fn test_message_timestamp_ms_to_seconds() {
        assert_eq!(message_timestamp(Some("1700000000123")), Some(1_700_000_000));
        assert_eq!(message_timestamp(Some("junk")), None);
        assert_eq!(message_timestamp(None), None);
    }
}
