use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::error;

use cortege_route::{LatLon, Route};
use cortege_tracker::{EventLog, Relationship, RouteChangeRecord};

const ROUTES_FILE: &str = "routes.json";
const RELATIONSHIPS_FILE: &str = "relationships.json";
const EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug, Deserialize)]
struct RouteFile {
    name: String,
    nodes: Vec<LatLon>,
}

pub struct Storage {
    base: PathBuf,
}

impl Storage {
    pub fn new(base: &str) -> anyhow::Result<Self> {
        let path = PathBuf::from(base);
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        Ok(Self { base: path })
    }

    pub fn load_routes(&self) -> anyhow::Result<Vec<Route>> {
        let files: Vec<RouteFile> = self.load_json(ROUTES_FILE)?.unwrap_or_default();
        let mut routes = Vec::with_capacity(files.len());
        for file in files {
            routes.push(Route::new(file.name, file.nodes)?);
        }
        Ok(routes)
    }

    /// `None` when no relationships file exists, which disables friend lookup.
    pub fn load_relationships(&self) -> anyhow::Result<Option<Vec<Relationship>>> {
        self.load_json(RELATIONSHIPS_FILE)
    }

    pub fn last_route_change(&self) -> anyhow::Result<Option<RouteChangeRecord>> {
        let path = self.base.join(EVENTS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        match content.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(line) => Ok(Some(serde_json::from_str(line)?)),
            None => Ok(None),
        }
    }

    pub fn append_event(&self, record: &RouteChangeRecord) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.base.join(EVENTS_FILE))?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    pub async fn append_event_async(&self, record: RouteChangeRecord) -> anyhow::Result<()> {
        let base = self.base.clone();
        tokio::task::spawn_blocking(move || {
            let storage = Storage { base };
            storage.append_event(&record)
        })
        .await??;
        Ok(())
    }

    fn load_json<T: serde::de::DeserializeOwned>(&self, file: &str) -> anyhow::Result<Option<T>> {
        let path = self.base.join(file);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let data = serde_json::from_str(&content)?;
        Ok(Some(data))
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }
}

/// Event log that hands records to a background writer so callers never wait
/// on the disk.
pub struct FileEventLog {
    tx: mpsc::UnboundedSender<RouteChangeRecord>,
}

impl FileEventLog {
    pub fn spawn(storage: Arc<Storage>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<RouteChangeRecord>();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(err) = storage.append_event_async(record.clone()).await {
                    error!(%err, route = %record.route_name, "failed to write route change");
                }
            }
        });
        Self { tx }
    }
}

impl EventLog for FileEventLog {
    fn append(&self, record: RouteChangeRecord) -> anyhow::Result<()> {
        self.tx
            .send(record)
            .map_err(|_| anyhow::anyhow!("event writer stopped"))
    }
}
