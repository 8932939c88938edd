use crate::error::{Result, SluiceError};
use crate::types::value::Fields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an entry within a log
///
/// Ordering is numeric on the millisecond timestamp first, then on the
/// sequence number, which is exactly the order entries were appended in.
/// Field order matters: the derived `Ord` depends on it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntryId {
    /// Milliseconds since the Unix epoch
    pub ms: u64,

    /// Sequence within the same millisecond
    pub seq: u64,
}

impl EntryId {
    /// The smallest possible id (`0-0`)
    pub const MIN: EntryId = EntryId { ms: 0, seq: 0 };

    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Smallest id that can exist at the given millisecond
    pub const fn at_millis(ms: u64) -> Self {
        Self { ms, seq: 0 }
    }

    /// Smallest id that can exist at the given wall-clock time
    ///
    /// Times before the epoch clamp to [`EntryId::MIN`].
    pub fn from_time(time: DateTime<Utc>) -> Self {
        let ms = time.timestamp_millis().max(0) as u64;
        Self::at_millis(ms)
    }

    /// The id immediately following this one
    pub fn next(self) -> Self {
        match self.seq.checked_add(1) {
            Some(seq) => Self { ms: self.ms, seq },
            None => Self {
                ms: self.ms + 1,
                seq: 0,
            },
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SluiceError::InvalidEntryId(s.to_string());

        match s.split_once('-') {
            Some((ms, seq)) => Ok(Self {
                ms: ms.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            // A bare timestamp means "sequence 0" in the text form
            None => Ok(Self::at_millis(s.parse().map_err(|_| invalid())?)),
        }
    }
}

/// A lower trim boundary, or the absence of one
///
/// `Unbounded` is declared last so the derived ordering puts it above every
/// concrete id, while two `Unbounded` values compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrimBound {
    /// Entries with ids below this one may be trimmed
    At(EntryId),

    /// No restriction from this criterion
    Unbounded,
}

impl TrimBound {
    pub fn is_bounded(&self) -> bool {
        matches!(self, TrimBound::At(_))
    }

    pub fn id(&self) -> Option<EntryId> {
        match self {
            TrimBound::At(id) => Some(*id),
            TrimBound::Unbounded => None,
        }
    }

    /// The most conservative (earliest) of the given bounds
    ///
    /// Returns `Unbounded` when the iterator is empty or every input is
    /// unbounded.
    pub fn min_of<I: IntoIterator<Item = TrimBound>>(bounds: I) -> TrimBound {
        bounds.into_iter().min().unwrap_or(TrimBound::Unbounded)
    }
}

impl From<EntryId> for TrimBound {
    fn from(id: EntryId) -> Self {
        TrimBound::At(id)
    }
}

impl fmt::Display for TrimBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrimBound::At(id) => id.fmt(f),
            TrimBound::Unbounded => f.write_str("+"),
        }
    }
}

/// One appended record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub fields: Fields,
}

impl Entry {
    pub fn new(id: EntryId, fields: Fields) -> Self {
        Self { id, fields }
    }
}

/// Summary of a consumer group's pending set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSummary {
    /// Number of delivered but unacknowledged entries
    pub count: u64,

    /// Earliest pending id (None when nothing is pending)
    pub lower: Option<EntryId>,

    /// Latest pending id (None when nothing is pending)
    pub upper: Option<EntryId>,
}

impl PendingSummary {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Where an accepted message was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appended {
    /// Log the entry landed in
    pub log: String,

    /// Id assigned by the store
    pub id: EntryId,
}
