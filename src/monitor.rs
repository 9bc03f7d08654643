//! Classification of engine output lines and fan-out of splice alerts.
//
// The engine's output contract is line-oriented UTF-8 text (optionally JSON per line when its
// analysis plugins are given a JSON flag); we treat both as opaque lines. Whether a line is
// splice-related is decided by a single case-insensitive keyword test, centralized here so
// the keyword list lives in exactly one place. The test is intentionally permissive: a false
// positive from an unrelated log line is acceptable, a missed splice line is not.
//
// Matched lines become append-only AlertRecords. Every subscribed sink receives every record
// in arrival order (total order per monitor instance); each sink drains its own queue on its
// own task, so a slow or failing sink never stalls ingestion or the other sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};


/// Keywords marking a line as splice-related. Substring match, case-insensitive, first match
/// wins so a line is never recorded twice even when several keywords hit.
pub const SPLICE_KEYWORDS: [&str; 6] = ["splice", "scte", "cue", "break", "insert", "time_signal"];

/// Classify one output line; returns the matched keyword, or None for unrelated lines.
pub fn classify(line: &str) -> Option<&'static str> {
    let lowered = line.to_lowercase();
    SPLICE_KEYWORDS.iter().find(|kw| lowered.contains(**kw)).copied()
}

/// One classified splice-related output line. Never mutated after insertion into the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    /// Which monitored stream produced the line (e.g. "engine/stdout").
    pub source_id: String,
    pub raw_line: String,
    /// The keyword that matched.
    pub classified_kind: String,
}

#[derive(Default)]
struct SinkRegistry {
    senders: Vec<mpsc::UnboundedSender<AlertRecord>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Consumes a supervised process's line channel, classifies each line, and fans alert
/// records out to subscribed sinks.
pub struct AlertMonitor {
    log: Arc<Mutex<Vec<AlertRecord>>>,
    sinks: Arc<Mutex<SinkRegistry>>,
    ingest: Option<JoinHandle<()>>,
}

impl AlertMonitor {
    /// Start monitoring `lines` (typically [`crate::SupervisedProcess::stdout_lines`]).
    /// `source_id` labels the records. Must be called within a tokio runtime.
    pub fn new(source_id: &str, mut lines: mpsc::Receiver<String>) -> AlertMonitor {
        let log: Arc<Mutex<Vec<AlertRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let sinks: Arc<Mutex<SinkRegistry>> = Arc::new(Mutex::new(SinkRegistry::default()));

        let source_id = source_id.to_string();
        let ingest_log = Arc::clone(&log);
        let ingest_sinks = Arc::clone(&sinks);
        let ingest = tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                let Some(kind) = classify(&line) else {
                    trace!("Unclassified line from {source_id}: {line}");
                    continue;
                };
                let record = AlertRecord {
                    timestamp: Utc::now(),
                    source_id: source_id.clone(),
                    raw_line: line,
                    classified_kind: kind.to_string(),
                };
                debug!("Splice alert ({kind}) from {source_id}: {}", record.raw_line);
                // Recover a poisoned guard rather than dropping the record; the log is
                // append-only, so a panic elsewhere cannot have left it half-written.
                ingest_log
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(record.clone());
                // A closed sender means that sink's task is gone; drop it from the fan-out.
                ingest_sinks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .senders
                    .retain(|tx| tx.send(record.clone()).is_ok());
            }
            debug!("Alert monitor input channel closed");
        });

        AlertMonitor { log, sinks, ingest: Some(ingest) }
    }

    /// Register an alert sink. Each sink gets its own delivery queue and task: records reach
    /// it in ingest order, and a slow or panicking callback cannot stall ingestion or any
    /// other sink. Sinks registered before the first line observe every record.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(AlertRecord) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<AlertRecord>();
        let task = tokio::spawn(async move {
            // Keeps draining after the monitor shuts down, so pending notifications are
            // delivered rather than dropped.
            while let Some(record) = rx.recv().await {
                callback(record);
            }
        });
        let mut registry = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        registry.senders.push(tx);
        registry.tasks.push(task);
    }

    /// The most recent `limit` records, oldest first / newest last. Does not mutate the log.
    pub fn history(&self, limit: usize) -> Vec<AlertRecord> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let start = log.len().saturating_sub(limit);
        log[start..].to_vec()
    }

    /// Total number of records ingested so far.
    pub fn record_count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Wait for the input channel to close and every pending sink notification to be
    /// delivered. The history remains queryable afterwards.
    pub async fn join(&mut self) {
        if let Some(ingest) = self.ingest.take() {
            let _ = ingest.await;
        }
        // Ingest is done, so dropping the senders lets each sink task drain out and finish.
        let tasks = {
            let mut registry = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
            registry.senders.clear();
            std::mem::take(&mut registry.tasks)
        };
        for task in tasks {
            let _ = task.await;
        }
    }
}
