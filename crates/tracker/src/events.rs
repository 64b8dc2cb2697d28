use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteChangeRecord {
    pub route_name: String,
    pub timestamp: i64,
}

/// Sink for route changes. Implementations must not block the caller on I/O.
pub trait EventLog: Send + Sync {
    fn append(&self, record: RouteChangeRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryEventLog {
    records: Mutex<Vec<RouteChangeRecord>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RouteChangeRecord> {
        self.records.lock().expect("records lock").clone()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, record: RouteChangeRecord) -> anyhow::Result<()> {
        let mut records = self.records.lock().expect("records lock");
        records.push(record);
        Ok(())
    }
}
