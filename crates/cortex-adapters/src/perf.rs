use std::time::{Duration, Instant};

/// Collects human-readable phase timings for `SyncResult::perf`.
pub struct PhaseTimer {
    started: Instant,
    current: Option<(String, Instant)>,
    entries: Vec<(String, String)>,
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            current: None,
            entries: Vec::new(),
        }
    }

    /// Close the previous phase (if any) and start a new one.
    pub fn phase(&mut self, name: &str) {
        self.finish_current();
        self.current = Some((name.to_string(), Instant::now()));
    }

    fn finish_current(&mut self) {
        if let Some((name, started)) = self.current.take() {
            self.entries.push((name, format_duration(started.elapsed())));
        }
    }

    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn into_entries(mut self) -> Vec<(String, String)> {
        self.finish_current();
        self.entries
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{secs:.2}s")
    } else {
        format!("{}m{:02}s", d.as_secs() / 60, d.as_secs() % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_are_recorded_in_order() {
        let mut timer = PhaseTimer::new();
        timer.phase("threads");
        timer.phase("messages");
        let entries = timer.into_entries();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["threads", "messages"]);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m15s");
    }
}
