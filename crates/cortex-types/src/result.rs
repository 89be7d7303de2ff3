use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters returned by one adapter sync.
///
/// `perf` carries human-readable phase timings keyed by phase name,
/// e.g. `("messages", "1.42s")`. Order follows the phase execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub events_created: u64,
    pub events_updated: u64,
    pub threads_created: u64,
    pub threads_updated: u64,
    pub attachments_created: u64,
    pub attachments_updated: u64,
    pub reactions_created: u64,
    pub reactions_updated: u64,
    pub persons_created: u64,
    pub participants_skipped: u64,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub perf: Vec<(String, String)>,
}

impl SyncResult {
    pub fn merge(&mut self, other: &SyncResult) {
        self.events_created += other.events_created;
        self.events_updated += other.events_updated;
        self.threads_created += other.threads_created;
        self.threads_updated += other.threads_updated;
        self.attachments_created += other.attachments_created;
        self.attachments_updated += other.attachments_updated;
        self.reactions_created += other.reactions_created;
        self.reactions_updated += other.reactions_updated;
        self.persons_created += other.persons_created;
        self.participants_skipped += other.participants_skipped;
    }

    pub fn is_empty(&self) -> bool {
        self.events_created == 0
            && self.events_updated == 0
            && self.threads_created == 0
            && self.threads_updated == 0
            && self.attachments_created == 0
            && self.attachments_updated == 0
            && self.reactions_created == 0
            && self.reactions_updated == 0
            && self.persons_created == 0
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates() {
        let mut a = SyncResult {
            events_created: 2,
            threads_created: 1,
            ..Default::default()
        };
        let b = SyncResult {
            events_created: 3,
            events_updated: 1,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.events_created, 5);
        assert_eq!(a.events_updated, 1);
        assert_eq!(a.threads_created, 1);
    }

    #[test]
    fn test_is_empty_ignores_skips() {
        let r = SyncResult {
            participants_skipped: 4,
            ..Default::default()
        };
        assert!(r.is_empty());
    }
}
