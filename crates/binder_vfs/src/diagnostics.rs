//! Typed diagnostic events.
//!
//! Mounting and lookups report non-fatal conditions (skipped shards, unknown
//! hashes, duplicate paths, ambiguous fallback matches, integrity failures) as
//! [`DiagnosticEvent`]s. Every event is logged through `tracing` and handed to a
//! [`DiagnosticSink`]; presentation is left to the caller.
//!
//! The crate ships [`DiagnosticReport`], a sink that simply collects events so a
//! caller can inspect them after mounting.

use crate::path::PathKey;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// A non-fatal condition observed while mounting or reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DiagnosticEvent {
    /// A shard's index could not be opened or parsed and was skipped.
    #[serde(rename_all = "camelCase")]
    InvalidArchiveIndex { shard: String, reason: String },

    /// A header's hash is not in the name dictionary; the file is reachable only
    /// through raw enumeration and the hash fallback.
    #[serde(rename_all = "camelCase")]
    MissingDictionaryEntry { shard: String, hash: u64 },

    /// An unresolved hash appeared again, in the same shard or a later one.
    /// Both headers stay enumerable; the hash fallback picks the first.
    #[serde(rename_all = "camelCase")]
    SharedUnresolvedHash {
        hash: u64,
        first_shard: String,
        shard: String,
    },

    /// Two headers resolved to the same canonical path; the first was kept.
    #[serde(rename_all = "camelCase")]
    DuplicatePath {
        path: PathKey,
        kept_shard: String,
        dropped_shard: String,
    },

    /// Two dictionary lines hash to the same value; the first was kept.
    #[serde(rename_all = "camelCase")]
    DictionaryCollision {
        hash: u64,
        kept: String,
        dropped: String,
    },

    /// A path missed the index and was looked up by hash scan.
    #[serde(rename_all = "camelCase")]
    FallbackLookup {
        path: PathKey,
        hash: u64,
        matches: usize,
    },

    /// The hash scan found several candidates; the first in shard/bucket order won.
    #[serde(rename_all = "camelCase")]
    HashCollisionAmbiguous {
        path: PathKey,
        hash: u64,
        candidates: Vec<String>,
    },

    /// A file's digest did not match its contents.
    #[serde(rename_all = "camelCase")]
    IntegrityMismatch { shard: String, hash: u64, strict: bool },
}

impl DiagnosticEvent {
    /// Log this event at a level matching its severity.
    pub fn log(&self) {
        match self {
            DiagnosticEvent::InvalidArchiveIndex { shard, reason } => {
                tracing::warn!("Skipping shard '{}': {}", shard, reason);
            }
            DiagnosticEvent::MissingDictionaryEntry { shard, hash } => {
                tracing::debug!("Unresolved hash {:016x} in shard '{}'", hash, shard);
            }
            DiagnosticEvent::SharedUnresolvedHash {
                hash,
                first_shard,
                shard,
            } => {
                tracing::warn!(
                    "Unresolved hash {:016x} in shard '{}' is also stored in '{}'",
                    hash,
                    shard,
                    first_shard
                );
            }
            DiagnosticEvent::DuplicatePath {
                path,
                kept_shard,
                dropped_shard,
            } => {
                tracing::warn!(
                    "Duplicate path {} in shard '{}' (already provided by '{}'), skipping",
                    path,
                    dropped_shard,
                    kept_shard
                );
            }
            DiagnosticEvent::DictionaryCollision { hash, kept, dropped } => {
                tracing::warn!(
                    "Dictionary collision {:016x}: keeping '{}', dropping '{}'",
                    hash,
                    kept,
                    dropped
                );
            }
            DiagnosticEvent::FallbackLookup {
                path,
                hash,
                matches,
            } => {
                tracing::debug!(
                    "Fallback lookup for {} ({:016x}): {} match(es)",
                    path,
                    hash,
                    matches
                );
            }
            DiagnosticEvent::HashCollisionAmbiguous {
                path,
                hash,
                candidates,
            } => {
                tracing::warn!(
                    "Ambiguous fallback for {} ({:016x}): candidates [{}], using the first",
                    path,
                    hash,
                    candidates.join(", ")
                );
            }
            DiagnosticEvent::IntegrityMismatch {
                shard,
                hash,
                strict,
            } => {
                if *strict {
                    tracing::error!("Integrity mismatch for {:016x} in shard '{}'", hash, shard);
                } else {
                    tracing::warn!(
                        "Integrity mismatch for {:016x} in shard '{}', returning data anyway",
                        hash,
                        shard
                    );
                }
            }
        }
    }
}

/// Receives diagnostic events. Implementations must tolerate concurrent calls.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

/// Sink that only logs (events are always logged before reaching a sink).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlySink;

impl DiagnosticSink for LogOnlySink {
    fn emit(&self, _event: DiagnosticEvent) {}
}

/// Collects every event it receives.
#[derive(Debug, Default)]
pub struct DiagnosticReport {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl DiagnosticReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far, in arrival order.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Number of events matching a predicate.
    pub fn count(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn summary(&self) -> DiagnosticSummary {
        let mut summary = DiagnosticSummary::default();
        for event in self.events.lock().iter() {
            match event {
                DiagnosticEvent::InvalidArchiveIndex { .. } => summary.invalid_shards += 1,
                DiagnosticEvent::MissingDictionaryEntry { .. } => summary.unresolved_hashes += 1,
                DiagnosticEvent::SharedUnresolvedHash { .. } => summary.shared_unresolved_hashes += 1,
                DiagnosticEvent::DuplicatePath { .. } => summary.duplicate_paths += 1,
                DiagnosticEvent::DictionaryCollision { .. } => summary.dictionary_collisions += 1,
                DiagnosticEvent::FallbackLookup { .. } => summary.fallback_lookups += 1,
                DiagnosticEvent::HashCollisionAmbiguous { .. } => summary.ambiguous_lookups += 1,
                DiagnosticEvent::IntegrityMismatch { .. } => summary.integrity_mismatches += 1,
            }
        }
        summary
    }
}

impl DiagnosticSink for DiagnosticReport {
    fn emit(&self, event: DiagnosticEvent) {
        self.events.lock().push(event);
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Arc<T> {
    fn emit(&self, event: DiagnosticEvent) {
        (**self).emit(event)
    }
}

/// Forwards every event to two sinks.
#[derive(Debug, Clone)]
pub struct TeeSink<A, B>(pub A, pub B);

impl<A: DiagnosticSink, B: DiagnosticSink> DiagnosticSink for TeeSink<A, B> {
    fn emit(&self, event: DiagnosticEvent) {
        self.0.emit(event.clone());
        self.1.emit(event);
    }
}

/// Per-kind event counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSummary {
    pub invalid_shards: usize,
    pub unresolved_hashes: usize,
    pub shared_unresolved_hashes: usize,
    pub duplicate_paths: usize,
    pub dictionary_collisions: usize,
    pub fallback_lookups: usize,
    pub ambiguous_lookups: usize,
    pub integrity_mismatches: usize,
}

/// Log an event, then forward it to `sink`.
pub(crate) fn emit(sink: &dyn DiagnosticSink, event: DiagnosticEvent) {
    event.log();
    sink.emit(event);
}
