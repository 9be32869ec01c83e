//! Single-record store with content-hash tamper detection and history restore.
//!
//! The store owns one `current` record plus an append-only history of every
//! record it superseded. Tampering is anything that changes `current` without
//! going through [`IntegrityStore::write`]; it shows up as a digest that no
//! longer matches the content and is resolved by restoring a history entry.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// `2026-10-19T08:15:30.123Z`
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("integrity failure: stored digest {stored} does not match content digest {recomputed}")]
    IntegrityFailure { stored: ContentDigest, recomputed: ContentDigest },
    #[error("restore point not found: {0}")]
    NotFound(NotFoundReason),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NotFoundReason {
    EmptyHistory,
    /// The requested key as the caller spelled it.
    UnknownTimestamp(String),
}

impl Display for NotFoundReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyHistory => write!(f, "history is empty"),
            Self::UnknownTimestamp(timestamp) => write!(f, "no history entry at {timestamp}"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
#[error("invalid timestamp `{input}`: expected YYYY-MM-DDTHH:MM:SS.mmmZ")]
pub struct ParseTimestampError {
    pub input: String,
}

/// Lowercase hex SHA-256 of a record's content.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash function used for every integrity comparison in the store.
#[must_use]
pub fn content_digest(content: &str) -> ContentDigest {
    ContentDigest(format!("{:x}", Sha256::digest(content.as_bytes())))
}

/// UTC instant at millisecond precision; the history lookup key.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordTimestamp(OffsetDateTime);

impl RecordTimestamp {
    /// Normalise to UTC and drop everything below one millisecond.
    #[must_use]
    pub fn from_datetime(value: OffsetDateTime) -> Self {
        let utc = value.to_offset(UtcOffset::UTC);
        Self(utc.replace_millisecond(utc.millisecond()).unwrap_or(utc))
    }

    fn next_millisecond(self) -> Self {
        Self(self.0.checked_add(Duration::MILLISECOND).unwrap_or(self.0))
    }
}

impl Display for RecordTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rendered = self.0.format(TIMESTAMP_FORMAT).map_err(|_| std::fmt::Error)?;
        f.write_str(&rendered)
    }
}

impl FromStr for RecordTimestamp {
    type Err = ParseTimestampError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        PrimitiveDateTime::parse(input, TIMESTAMP_FORMAT)
            .map(|parsed| Self(parsed.assume_utc()))
            .map_err(|_| ParseTimestampError { input: input.to_string() })
    }
}

impl Serialize for RecordTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Record {
    pub content: String,
    pub integrity: ContentDigest,
    pub timestamp: RecordTimestamp,
}

impl Record {
    fn seal(content: String, timestamp: RecordTimestamp) -> Self {
        let integrity = content_digest(&content);
        Self { content, integrity, timestamp }
    }

    /// Whether the stored digest still matches the content.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        content_digest(&self.content) == self.integrity
    }
}

/// Outcome of checking a caller-held copy against the store.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Verification {
    Match,
    Mismatch(RestorePoints),
}

impl Verification {
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RestorePoints {
    /// History timestamps in insertion order, oldest first.
    pub timestamps: Vec<RecordTimestamp>,
    /// The most recently archived entry.
    pub default: RecordTimestamp,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StoreSnapshot {
    pub current: Record,
    pub history: Vec<Record>,
}

/// Out-of-band corruption of the current record.
#[cfg(any(test, feature = "fault-injection"))]
#[derive(Debug, Clone)]
pub enum Tamper {
    Content(String),
    Integrity(ContentDigest),
}

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug)]
struct StoreState {
    current: Record,
    /// Last record the store installed itself. Out-of-band edits never reach it.
    sealed: Record,
    history: Vec<Record>,
    last_issued: RecordTimestamp,
}

impl StoreState {
    fn issue_timestamp(&mut self, now: OffsetDateTime) -> RecordTimestamp {
        let mut candidate = RecordTimestamp::from_datetime(now);
        if candidate <= self.last_issued {
            candidate = self.last_issued.next_millisecond();
        }
        self.last_issued = candidate;
        candidate
    }

    fn find_in_history(&self, timestamp: RecordTimestamp) -> Option<&Record> {
        self.history.iter().find(|entry| entry.timestamp == timestamp)
    }

    /// Append `record` unless an entry with its timestamp is already archived.
    fn archive(&mut self, record: Record) -> bool {
        if self.find_in_history(record.timestamp).is_some() {
            return false;
        }
        self.history.push(record);
        true
    }

    fn restore(
        &mut self,
        timestamp: Option<RecordTimestamp>,
        key: &str,
    ) -> Result<Record, StoreError> {
        if self.history.is_empty() {
            return Err(StoreError::NotFound(NotFoundReason::EmptyHistory));
        }
        let Some(entry) = timestamp.and_then(|timestamp| self.find_in_history(timestamp)).cloned()
        else {
            return Err(StoreError::NotFound(NotFoundReason::UnknownTimestamp(key.to_string())));
        };

        self.current = entry.clone();
        self.sealed = entry.clone();
        tracing::info!(timestamp = %entry.timestamp, "record restored from history");
        Ok(entry)
    }

    fn restore_points(&self) -> Vec<RecordTimestamp> {
        self.history.iter().map(|entry| entry.timestamp).collect()
    }
}

/// The single-record store. Every operation runs under one lock.
#[derive(Debug)]
pub struct IntegrityStore {
    state: Mutex<StoreState>,
    clock: Box<dyn Clock>,
}

impl IntegrityStore {
    #[must_use]
    pub fn new(seed: impl Into<String>) -> Self {
        Self::with_clock(seed, SystemClock)
    }

    #[must_use]
    pub fn with_clock(seed: impl Into<String>, clock: impl Clock + 'static) -> Self {
        let timestamp = RecordTimestamp::from_datetime(clock.now());
        let current = Record::seal(seed.into(), timestamp);
        let state = StoreState {
            sealed: current.clone(),
            current,
            history: Vec::new(),
            last_issued: timestamp,
        };
        Self { state: Mutex::new(state), clock: Box::new(clock) }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current content, with no verification.
    #[must_use]
    pub fn read(&self) -> String {
        self.lock().current.content.clone()
    }

    /// Replace the current content after checking the current record is intact.
    ///
    /// The superseded record is appended to history before the swap, unless a
    /// tamper check or an earlier restore already archived it.
    ///
    /// # Errors
    /// Returns [`StoreError::IntegrityFailure`] when the current digest no longer
    /// matches its content. The state is left untouched in that case.
    pub fn write(&self, content: impl Into<String>) -> Result<Record, StoreError> {
        let now = self.clock.now();
        let mut state = self.lock();

        let recomputed = content_digest(&state.current.content);
        if recomputed != state.current.integrity {
            tracing::warn!(
                timestamp = %state.current.timestamp,
                "write rejected: current record failed integrity check"
            );
            return Err(StoreError::IntegrityFailure {
                stored: state.current.integrity.clone(),
                recomputed,
            });
        }

        let timestamp = state.issue_timestamp(now);
        let next = Record::seal(content.into(), timestamp);
        let previous = std::mem::replace(&mut state.current, next.clone());
        state.archive(previous);
        state.sealed = next.clone();

        tracing::debug!(timestamp = %timestamp, history_len = state.history.len(), "record written");
        Ok(next)
    }

    /// Compare a caller-held copy with the stored digest.
    ///
    /// On mismatch the last record this store installed is archived, once, so it
    /// stays available as a restore point.
    pub fn verify(&self, candidate: &str) -> Verification {
        let candidate_digest = content_digest(candidate);
        let mut state = self.lock();

        if candidate_digest == state.current.integrity {
            return Verification::Match;
        }

        let sealed = state.sealed.clone();
        let sealed_timestamp = sealed.timestamp;
        let archived = state.archive(sealed);

        let timestamps = state.restore_points();
        let default = timestamps.last().copied().unwrap_or(sealed_timestamp);
        tracing::warn!(
            current = %state.current.timestamp,
            archived,
            restore_points = timestamps.len(),
            "tampering detected"
        );
        Verification::Mismatch(RestorePoints { timestamps, default })
    }

    /// Promote a history entry back to current, verbatim.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when history is empty or holds no entry
    /// with exactly `timestamp`.
    pub fn restore(&self, timestamp: RecordTimestamp) -> Result<Record, StoreError> {
        self.lock().restore(Some(timestamp), &timestamp.to_string())
    }

    /// Same as [`IntegrityStore::restore`], keyed by the rendered timestamp.
    ///
    /// A key that is not a well-formed timestamp cannot name any history entry,
    /// so it is reported as not found.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when history is empty or no entry has
    /// that timestamp.
    pub fn restore_key(&self, key: &str) -> Result<Record, StoreError> {
        let timestamp = key.parse::<RecordTimestamp>().ok();
        self.lock().restore(timestamp, key)
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.lock();
        StoreSnapshot { current: state.current.clone(), history: state.history.clone() }
    }

    #[must_use]
    pub fn restore_points(&self) -> Vec<RecordTimestamp> {
        self.lock().restore_points()
    }

    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.lock().current.is_intact()
    }

    /// Corrupt the current record without going through [`IntegrityStore::write`].
    #[cfg(any(test, feature = "fault-injection"))]
    pub fn inject_tampering(&self, tamper: Tamper) {
        let mut state = self.lock();
        match tamper {
            Tamper::Content(content) => state.current.content = content,
            Tamper::Integrity(integrity) => state.current.integrity = integrity,
        }
    }
}
