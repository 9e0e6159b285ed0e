use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One prompt/response exchange, recorded for the host's debug console.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DebugLogEntry {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub character_name: String,
    pub prompt: String,
    pub response: String,
}

impl DebugLogEntry {
    pub fn new(
        character_name: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            character_name: character_name.into(),
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

/// Receiver of debug entries. May be called concurrently from many requests.
pub trait DebugLogSink: Send + Sync {
    fn record(&self, entry: DebugLogEntry);
}

impl<F> DebugLogSink for F
where
    F: Fn(DebugLogEntry) + Send + Sync,
{
    fn record(&self, entry: DebugLogEntry) {
        self(entry);
    }
}

/// In-memory sink.
#[derive(Clone, Debug, Default)]
pub struct MemoryDebugLog {
    entries: Arc<Mutex<Vec<DebugLogEntry>>>,
}

impl MemoryDebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DebugLogEntry> {
        self.entries.lock().clone()
    }
}

impl DebugLogSink for MemoryDebugLog {
    fn record(&self, entry: DebugLogEntry) {
        self.entries.lock().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_are_sinks() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let sink = move |_entry: DebugLogEntry| {
            counter.fetch_add(1, Ordering::Relaxed);
        };
        sink.record(DebugLogEntry::new("Mira", "p", "r"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn entry_serializes_camel_case() {
        let entry = DebugLogEntry::new("Mira", "prompt", "response");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["characterName"], "Mira");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn memory_sink_collects_from_threads() {
        let log = MemoryDebugLog::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || log.record(DebugLogEntry::new(format!("c{i}"), "p", "r")))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.entries().len(), 4);
    }
}
