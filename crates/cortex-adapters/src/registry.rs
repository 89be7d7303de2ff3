use serde::de::DeserializeOwned;

use crate::aix::{AixAdapter, AixOptions};
use crate::bird::{BirdAdapter, BirdOptions};
use crate::calendar::{CalendarAdapter, CalendarOptions};
use crate::contract::SyncAdapter;
use crate::error::{Error, Result};
use crate::gcontacts::{ContactsAdapter, ContactsOptions};
use crate::gmail::{GmailAdapter, GmailOptions};
use crate::imessage::{ImessageAdapter, ImessageOptions};
use crate::nexus::{NexusAdapter, NexusOptions};

/// A configured adapter instance, decoupled from the config-file format.
#[derive(Debug, Clone)]
pub struct AdapterSpec {
    /// Instance name: `source_adapter`, watermark key, and sync-job key.
    pub name: String,
    /// Adapter type tag from the config.
    pub kind: String,
    /// Free-form options map, deserialized per adapter type.
    pub options: serde_json::Value,
}

fn parse_options<T: DeserializeOwned>(spec: &AdapterSpec) -> Result<T> {
    serde_json::from_value(spec.options.clone()).map_err(|err| {
        Error::Environment(format!(
            "adapter {} ({}): invalid options: {err}",
            spec.name, spec.kind
        ))
    })
}

/// Closed-set dispatch on the adapter type tag.
pub fn build_adapter(spec: &AdapterSpec) -> Result<Box<dyn SyncAdapter>> {
    match spec.kind.as_str() {
        // `eve` is the legacy name for the chat-database adapter.
        "imessage" | "eve" => {
            let options: ImessageOptions = parse_options(spec)?;
            Ok(Box::new(ImessageAdapter::new(spec.name.clone(), options)))
        }
        "gogcli" => {
            let options: GmailOptions = parse_options(spec)?;
            Ok(Box::new(GmailAdapter::new(spec.name.clone(), options)))
        }
        "gogcli_calendar" => {
            let options: CalendarOptions = parse_options(spec)?;
            Ok(Box::new(CalendarAdapter::new(spec.name.clone(), options)))
        }
        "gogcli_contacts" => {
            let options: ContactsOptions = parse_options(spec)?;
            Ok(Box::new(ContactsAdapter::new(spec.name.clone(), options)))
        }
        "aix" => {
            let options: AixOptions = parse_options(spec)?;
            Ok(Box::new(AixAdapter::new(spec.name.clone(), options)))
        }
        "nexus" => {
            let options: NexusOptions = parse_options(spec)?;
            Ok(Box::new(NexusAdapter::new(spec.name.clone(), options)))
        }
        "bird" => {
            let options: BirdOptions = parse_options(spec)?;
            Ok(Box::new(BirdAdapter::new(spec.name.clone(), options)))
        }
        other => Err(Error::Environment(format!(
            "unknown adapter type: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: &str, options: serde_json::Value) -> AdapterSpec {
        AdapterSpec {
            name: "test".to_string(),
            kind: kind.to_string(),
            options,
        }
    }

    #[test]
    fn test_known_types_build() {
        for (kind, options) in [
            ("imessage", serde_json::json!({})),
            ("eve", serde_json::json!({})),
            ("gogcli", serde_json::json!({})),
            ("gogcli_calendar", serde_json::json!({})),
            ("gogcli_contacts", serde_json::json!({})),
            ("aix", serde_json::json!({"db_path": "/tmp/sessions.db"})),
            ("nexus", serde_json::json!({"dir": "/tmp/logs"})),
            ("bird", serde_json::json!({})),
        ] {
            let adapter = build_adapter(&spec(kind, options)).unwrap();
            assert_eq!(adapter.name(), "test");
        }
    }

    #[test]
    fn test_unknown_type_is_environment_error() {
        let err = build_adapter(&spec("telegram", serde_json::json!({}))).err().unwrap();
        assert!(matches!(err, Error::Environment(_)));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let err = build_adapter(&spec("gogcli", serde_json::json!({"bogus_key": 1})))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Environment(_)));
    }
}
