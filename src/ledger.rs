//! Room occupancy keys and the per-run generation session.

use crate::data::{DayOfWeek, LedgerInfo, Session};
use crate::error::StoreError;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A room busy at a recurring weekly (day, session) slot.
///
/// Stored as `"roomCode|day|session"`; the string form only exists at the
/// persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccupancyKey {
    pub room_code: String,
    pub day: DayOfWeek,
    pub session: Session,
}

impl OccupancyKey {
    pub fn new(room_code: impl Into<String>, day: DayOfWeek, session: Session) -> Self {
        Self {
            room_code: room_code.into(),
            day,
            session,
        }
    }
}

impl fmt::Display for OccupancyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.room_code, self.day, self.session)
    }
}

impl FromStr for OccupancyKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || StoreError::MalformedKey(s.to_string());
        // room codes may themselves contain '|', so split from the right
        let mut parts = s.rsplitn(3, '|');
        let session = parts.next().ok_or_else(malformed)?;
        let day = parts.next().ok_or_else(malformed)?;
        let room_code = parts.next().ok_or_else(malformed)?;
        if room_code.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            room_code: room_code.to_string(),
            day: day.trim().parse().map_err(|_| malformed())?,
            session: session.trim().parse().map_err(|_| malformed())?,
        })
    }
}

/// State of one generation run. Reservations only ever land in `reserved`;
/// `committed` is the baseline read when the run started.
#[derive(Debug, Clone, Default)]
pub struct GenerationSession {
    committed: HashSet<OccupancyKey>,
    reserved: HashSet<OccupancyKey>,
    cursor: i32,
}

impl GenerationSession {
    /// Starts a run from the committed baseline with an empty reservation set.
    pub fn initialize(committed: HashSet<OccupancyKey>, cursor: i32) -> Self {
        Self {
            committed,
            reserved: HashSet::new(),
            cursor,
        }
    }

    pub fn is_occupied(&self, key: &OccupancyKey) -> bool {
        self.reserved.contains(key) || self.committed.contains(key)
    }

    /// Records a speculative reservation. Returns false if it was already held.
    pub fn reserve(&mut self, key: OccupancyKey) -> bool {
        self.reserved.insert(key)
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: i32) {
        self.cursor = cursor;
    }

    pub fn reserved(&self) -> &HashSet<OccupancyKey> {
        &self.reserved
    }

    pub fn committed(&self) -> &HashSet<OccupancyKey> {
        &self.committed
    }

    pub fn into_reserved(self) -> HashSet<OccupancyKey> {
        self.reserved
    }

    /// Counts against a committed set that may have moved since the run started.
    pub fn info(&self, committed: &HashSet<OccupancyKey>, committed_cursor: i32) -> LedgerInfo {
        let session_only = self.reserved.difference(committed).count();
        LedgerInfo {
            session_only,
            committed: committed.len(),
            total: committed.len() + session_only,
            committed_cursor,
            session_cursor: Some(self.cursor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trips_through_storage_form() {
        let key = OccupancyKey::new("A2-301", 4, 2);
        assert_eq!(key.to_string(), "A2-301|4|2");
        assert_eq!("A2-301|4|2".parse::<OccupancyKey>().unwrap(), key);
    }

    #[test]
    fn key_with_pipe_in_room_code_parses() {
        let key: OccupancyKey = "LAB|B|7|3".parse().unwrap();
        assert_eq!(key, OccupancyKey::new("LAB|B", 7, 3));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        for raw in ["", "A1|2", "|2|1", "A1|x|1", "A1|2|300"] {
            assert!(raw.parse::<OccupancyKey>().is_err(), "{raw}");
        }
    }

    #[test]
    fn occupancy_checks_session_and_committed() {
        let committed: HashSet<_> = [OccupancyKey::new("R1", 2, 1)].into_iter().collect();
        let mut session = GenerationSession::initialize(committed.clone(), 5);

        assert!(session.is_occupied(&OccupancyKey::new("R1", 2, 1)));
        assert!(!session.is_occupied(&OccupancyKey::new("R2", 2, 1)));

        assert!(session.reserve(OccupancyKey::new("R2", 2, 1)));
        assert!(!session.reserve(OccupancyKey::new("R2", 2, 1)));
        assert!(session.is_occupied(&OccupancyKey::new("R2", 2, 1)));
        assert_eq!(session.committed().len(), 1);

        let info = session.info(&committed, 5);
        assert_eq!((info.session_only, info.committed, info.total), (1, 1, 2));
        assert_eq!(info.session_cursor, Some(5));
    }
}
