//! Identifier normalization. These are exact contracts: every stored
//! `contact_identifiers.normalized` value equals
//! `normalize_identifier(raw, type)`.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_SHAPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static PHONE_SHAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[\d\s\(\)\.\-]{5,}$").unwrap());

/// Normalize a raw identifier value for its type.
///
/// - `phone`: strip everything but digits and a leading `+`; bare 10-digit
///   national numbers get `+1`, 11 digits starting with `1` get `+`
/// - `email`: trim + lowercase
/// - `handle`: trim + lowercase, leading `@` dropped
/// - anything else: trim
pub fn normalize_identifier(raw: &str, identifier_type: &str) -> String {
    match identifier_type {
        "phone" => normalize_phone(raw),
        "email" => raw.trim().to_lowercase(),
        "handle" => raw.trim().to_lowercase().trim_start_matches('@').to_string(),
        _ => raw.trim().to_string(),
    }
}

fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut digits = String::with_capacity(trimmed.len());
    for (i, ch) in trimmed.chars().enumerate() {
        if ch.is_ascii_digit() || (ch == '+' && i == 0) {
            digits.push(ch);
        }
    }

    if digits.starts_with('+') {
        return digits;
    }
    if digits.len() == 10 {
        return format!("+1{digits}");
    }
    if digits.len() == 11 && digits.starts_with('1') {
        return format!("+{digits}");
    }
    digits
}

/// Whether a candidate display name is worth promoting to a Person.
///
/// Rejects empty strings, digit-only strings, raw identifiers (anything
/// phone- or email-shaped), and the well-known placeholders.
pub fn is_meaningful_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return false;
    }
    if !trimmed.chars().any(|c| !c.is_ascii_digit()) {
        return false;
    }
    if EMAIL_SHAPED.is_match(trimmed) || PHONE_SHAPED.is_match(trimmed) {
        return false;
    }
    !matches!(trimmed, "Me" | "Unknown" | "Unknown Contact")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_normalization_contracts() {
        assert_eq!(
            normalize_identifier("+1 (707) 287-4936", "phone"),
            "+17072874936"
        );
        assert_eq!(normalize_identifier("6376797", "phone"), "6376797");
        assert_eq!(normalize_identifier("+17079276461", "phone"), "+17079276461");
        assert_eq!(normalize_identifier("", "phone"), "");
    }

    #[test]
    fn test_phone_national_and_country_prefixes() {
        assert_eq!(normalize_identifier("7072874936", "phone"), "+17072874936");
        assert_eq!(normalize_identifier("17072874936", "phone"), "+17072874936");
        assert_eq!(normalize_identifier("(707) 287.4936", "phone"), "+17072874936");
    }

    #[test]
    fn test_email_and_handle_normalization() {
        assert_eq!(
            normalize_identifier("  Alice@Example.COM ", "email"),
            "alice@example.com"
        );
        assert_eq!(normalize_identifier("@SomeUser", "handle"), "someuser");
        assert_eq!(normalize_identifier("someuser", "handle"), "someuser");
    }

    #[test]
    fn test_other_types_only_trim() {
        assert_eq!(
            normalize_identifier("  chat-guid-ABC  ", "chat_guid"),
            "chat-guid-ABC"
        );
    }

    #[test]
    fn test_meaningful_name() {
        assert!(is_meaningful_name("Ada Lovelace"));
        assert!(is_meaningful_name("gpt-5"));
        assert!(!is_meaningful_name(""));
        assert!(!is_meaningful_name("   "));
        assert!(!is_meaningful_name("5551234567"));
        assert!(!is_meaningful_name("+1 (555) 123-4567"));
        assert!(!is_meaningful_name("alice@example.com"));
        assert!(!is_meaningful_name("Me"));
        assert!(!is_meaningful_name("Unknown"));
        assert!(!is_meaningful_name("Unknown Contact"));
    }
}
