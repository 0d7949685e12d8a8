use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Ledger-assigned timestamp identifying a consistent point-in-time view.
///
/// Wire format is RFC 3339; ordering is the ledger's ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordTime(pub DateTime<Utc>);

impl RecordTime {
    pub fn now() -> Self {
        RecordTime(Utc::now())
    }

    pub fn checked_add(self, delta: Duration) -> Option<RecordTime> {
        self.0.checked_add_signed(delta).map(RecordTime)
    }
}

impl fmt::Display for RecordTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl fmt::Debug for RecordTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordTime({})", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for RecordTime {
    fn from(value: DateTime<Utc>) -> Self {
        RecordTime(value)
    }
}
