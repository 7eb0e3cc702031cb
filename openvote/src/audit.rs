use crate::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One timed ledger operation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuditEntry {
    pub run_id: Uuid,
    pub operation: String,
    pub voters: usize,
    pub duration_ms: u128,
    pub cost: u64,
}

impl std::fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} duration: {}millis and gas used: {} for {} voters",
            self.operation, self.duration_ms, self.cost, self.voters
        )
    }
}

/// Append-only record of how long each operation took and what it cost
#[derive(Debug)]
pub struct AuditLog {
    run_id: Uuid,
    path: Option<PathBuf>,
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        AuditLog {
            run_id: Uuid::new_v4(),
            path,
            entries: Mutex::new(vec![]),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Start timing an operation
    pub fn start(&self) -> Instant {
        Instant::now()
    }

    pub fn record(&self, operation: &str, voters: usize, elapsed: Duration, cost: u64) {
        let entry = AuditEntry {
            run_id: self.run_id,
            operation: operation.to_owned(),
            voters,
            duration_ms: elapsed.as_millis(),
            cost,
        };
        info!("{}", entry);

        if let Some(path) = &self.path {
            let written = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{}", entry));
            if let Err(e) = written {
                warn!("unable to append to audit log {}: {}", path.display(), e);
            }
        }

        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
    }

    /// Record the time since `started`
    pub fn finish(&self, operation: &str, voters: usize, started: Instant, cost: u64) {
        self.record(operation, voters, started.elapsed(), cost)
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Total cost across all recorded operations
    pub fn total_cost(&self) -> u64 {
        self.entries().iter().map(|e| e.cost).sum()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        AuditLog::new(None)
    }
}
