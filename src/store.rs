//! Record Store
//!
//! The versioned store the converter reads child records from, plus an
//! in-memory implementation used by tests and the CLI.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::debug;

use crate::record::Record;
use crate::value::RecordValue;

/// Failure reported by a record store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("no record with OID '{0}'")]
    NotFound(String),

    #[error("a record with OID '{0}' already exists")]
    AlreadyExists(String),

    #[error("record store backend failure: {0}")]
    Backend(String),
}

/// Read access to stored records by OID
pub trait RecordFetch {
    fn fetch(&self, oid: &str) -> Result<Record, StoreError>;
}

/// A batch of changes applied atomically
#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub inserts: Vec<Record>,
    pub updates: Vec<Record>,
    pub deletes: Vec<String>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, record: Record) -> Self {
        self.inserts.push(record);
        self
    }

    pub fn update(mut self, record: Record) -> Self {
        self.updates.push(record);
        self
    }

    pub fn delete(mut self, oid: impl Into<String>) -> Self {
        self.deletes.push(oid.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// A versioned record store
pub trait RecordStore: RecordFetch {
    /// Apply a commit; returns the commit timestamp
    fn commit(&self, commit: Commit) -> Result<DateTime<Utc>, StoreError>;

    /// All versions of a record, oldest first
    fn history(&self, oid: &str) -> Result<Vec<Record>, StoreError>;

    /// Current records matching every key/value criterion
    fn query(&self, criteria: &BTreeMap<String, RecordValue>) -> Result<Vec<Record>, StoreError>;

    /// Records matching the criteria as they were at the given time
    fn query_at(
        &self,
        criteria: &BTreeMap<String, RecordValue>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError>;
}

impl RecordFetch for BTreeMap<String, Record> {
    fn fetch(&self, oid: &str) -> Result<Record, StoreError> {
        self.get(oid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(oid.to_string()))
    }
}

#[derive(Debug, Clone)]
struct Revision {
    /// `None` marks a deletion
    record: Option<Record>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StoreState {
    revisions: HashMap<String, Vec<Revision>>,
    last_commit: Option<DateTime<Utc>>,
}

impl StoreState {
    fn current(&self, oid: &str) -> Option<&Record> {
        self.revisions
            .get(oid)
            .and_then(|revs| revs.last())
            .and_then(|rev| rev.record.as_ref())
    }

    /// Deletion markers don't take a version number
    fn next_version(&self, oid: &str) -> u64 {
        self.revisions
            .get(oid)
            .map(|revs| revs.iter().filter(|r| r.record.is_some()).count() as u64 + 1)
            .unwrap_or(1)
    }

    /// Commit timestamps strictly increase even when the clock doesn't
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let timestamp = match self.last_commit {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(timestamp);
        timestamp
    }
}

/// Versioned record store kept in memory
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<StoreState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| {
                state
                    .revisions
                    .values()
                    .filter(|revs| revs.last().map(|r| r.record.is_some()).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("store lock poisoned".to_string())
}

impl RecordFetch for InMemoryRecordStore {
    fn fetch(&self, oid: &str) -> Result<Record, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        state
            .current(oid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(oid.to_string()))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn commit(&self, commit: Commit) -> Result<DateTime<Utc>, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;

        // Validate the whole batch before touching anything
        for record in &commit.inserts {
            if state.current(&record.oid).is_some() {
                return Err(StoreError::AlreadyExists(record.oid.clone()));
            }
        }
        for record in &commit.updates {
            if state.current(&record.oid).is_none() {
                return Err(StoreError::NotFound(record.oid.clone()));
            }
        }
        for oid in &commit.deletes {
            if state.current(oid).is_none() {
                return Err(StoreError::NotFound(oid.clone()));
            }
        }

        let timestamp = state.next_timestamp();
        let count = commit.inserts.len() + commit.updates.len() + commit.deletes.len();
        for mut record in commit.inserts.into_iter().chain(commit.updates) {
            record.version = state.next_version(&record.oid);
            let revision = Revision {
                record: Some(record.clone()),
                timestamp,
            };
            state.revisions.entry(record.oid).or_default().push(revision);
        }
        for oid in commit.deletes {
            state.revisions.entry(oid).or_default().push(Revision {
                record: None,
                timestamp,
            });
        }
        debug!(count, %timestamp, "committed records");
        Ok(timestamp)
    }

    fn history(&self, oid: &str) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        let revisions = state
            .revisions
            .get(oid)
            .ok_or_else(|| StoreError::NotFound(oid.to_string()))?;
        Ok(revisions.iter().filter_map(|r| r.record.clone()).collect())
    }

    fn query(&self, criteria: &BTreeMap<String, RecordValue>) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        let mut found: Vec<Record> = state
            .revisions
            .keys()
            .filter_map(|oid| state.current(oid))
            .filter(|record| record.matches(criteria))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.oid.cmp(&b.oid));
        Ok(found)
    }

    fn query_at(
        &self,
        criteria: &BTreeMap<String, RecordValue>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        let mut found: Vec<Record> = state
            .revisions
            .values()
            .filter_map(|revs| revs.iter().rev().find(|r| r.timestamp <= at))
            .filter_map(|rev| rev.record.as_ref())
            .filter(|record| record.matches(criteria))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.oid.cmp(&b.oid));
        Ok(found)
    }
}
