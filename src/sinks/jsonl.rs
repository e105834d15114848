use super::{Payload, Sink, SinkError};
use crate::types::{current_timestamp, AlertCandidate};
use async_trait::async_trait;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// One audit line per delivered alert
#[derive(Debug, Serialize)]
pub struct AuditEntry<'a> {
    pub recorded_at: i64,
    pub cluster: &'a str,
    #[serde(flatten)]
    pub alert: &'a AlertCandidate,
}

/// Size cap of the live file and how many full generations are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub max_bytes: u64,
    pub keep: u32,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            keep: 10,
        }
    }
}

/// Append-only audit file
///
/// A full file becomes `path.1`, older generations shift up to
/// `path.{keep}` and anything beyond that is deleted.
pub struct AuditLog {
    path: PathBuf,
    file: File,
    size: u64,
    retention: Retention,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>, retention: Retention) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            file,
            size,
            retention,
        })
    }

    pub fn append(&mut self, entry: &AuditEntry<'_>) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.size += line.len() as u64;

        if self.size >= self.retention.max_bytes {
            self.roll_over()?;
        }
        Ok(())
    }

    fn generation(&self, n: u32) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    fn roll_over(&mut self) -> io::Result<()> {
        let keep = self.retention.keep;
        if keep == 0 {
            fs::remove_file(&self.path)?;
        } else {
            let oldest = self.generation(keep);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (1..keep).rev() {
                let from = self.generation(n);
                if from.exists() {
                    fs::rename(&from, self.generation(n + 1))?;
                }
            }
            fs::rename(&self.path, self.generation(1))?;
        }

        self.file = open_append(&self.path)?;
        self.size = 0;
        log::info!("📄 Audit log {} rolled over", self.path.display());
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Audit trail of every alert that reached the sinks
pub struct JsonlAuditSink {
    log: Mutex<AuditLog>,
    cluster_name: String,
}

impl JsonlAuditSink {
    pub fn new(log: AuditLog, cluster_name: impl Into<String>) -> Self {
        Self {
            log: Mutex::new(log),
            cluster_name: cluster_name.into(),
        }
    }

    pub fn open(path: impl AsRef<Path>, cluster_name: impl Into<String>) -> Result<Self, SinkError> {
        Ok(Self::new(AuditLog::open(path, Retention::default())?, cluster_name))
    }
}

#[async_trait]
impl Sink for JsonlAuditSink {
    fn name(&self) -> &str {
        "audit"
    }

    async fn handle(&self, payload: Payload<'_>) -> Result<(), SinkError> {
        let Payload::Alert(alert) = payload else {
            return Ok(());
        };
        let entry = AuditEntry {
            recorded_at: current_timestamp(),
            cluster: &self.cluster_name,
            alert,
        };
        self.log.lock().await.append(&entry)
    }
}
