//! Room assignment: which catalog rooms a cohort may use, and the tightest free fit.

use crate::data::{DayOfWeek, Room, Session, SubjectScheduleRequest};
use crate::ledger::{GenerationSession, OccupancyKey};
use log::trace;

const CLC: &str = "clc";
const NT: &str = "nt";
const ENGLISH: &str = "english";
const GENERAL: &str = "general";
const YEAR_2024: &str = "2024";
const CLC_2024_NOTE: &str = "lớp clc 2024";
const ENGLISH_NOTE: &str = "tiếng anh";

/// Room pool a cohort is restricted to.
///
/// Exactly one policy applies to a request; see [`RoomPolicy::for_cohort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPolicy {
    /// CLC students admitted in 2024: rooms noted "lớp clc 2024".
    Clc2024,
    /// CLC students of other years: CLC rooms not reserved for 2024.
    ClcOtherYears,
    /// Relaxed CLC pool, only reached as the 2024 fallback.
    ClcAny,
    /// Other special programs never get a physical room here.
    Unassigned,
    /// 2022 cohort: the legacy "nt" rooms.
    LegacyNt,
    /// English subjects.
    English,
    General { allow_2024_pool: bool },
}

impl RoomPolicy {
    pub fn for_cohort(special_program: &str, cohort_year: &str, subject_type: &str) -> Self {
        let program = special_program.trim().to_lowercase();
        let year = cohort_year.trim();
        let subject_type = subject_type.trim().to_lowercase();

        match (program.as_str(), year, subject_type.as_str()) {
            (CLC, YEAR_2024, _) => RoomPolicy::Clc2024,
            (CLC, _, _) => RoomPolicy::ClcOtherYears,
            (p, _, _) if !p.is_empty() => RoomPolicy::Unassigned,
            (_, "2022", _) => RoomPolicy::LegacyNt,
            (_, _, ENGLISH) => RoomPolicy::English,
            (_, year, _) => RoomPolicy::General {
                allow_2024_pool: year == YEAR_2024,
            },
        }
    }

    pub fn for_subject(subject: &SubjectScheduleRequest) -> Self {
        Self::for_cohort(
            &subject.special_program,
            &subject.cohort_year,
            &subject.subject_type,
        )
    }

    pub fn admits(&self, room: &Room) -> bool {
        let tags = RoomTags::of(room);
        match self {
            RoomPolicy::Clc2024 => tags.note.contains(CLC_2024_NOTE),
            RoomPolicy::ClcOtherYears => tags.is_clc() && !tags.note.contains(YEAR_2024),
            RoomPolicy::ClcAny => tags.is_clc(),
            RoomPolicy::Unassigned => false,
            RoomPolicy::LegacyNt => tags.category == NT && tags.note_has(NT),
            RoomPolicy::English => tags.category == ENGLISH && tags.notes_english(),
            RoomPolicy::General { allow_2024_pool } => {
                !tags.is_nt()
                    && !tags.is_english()
                    && !tags.is_clc()
                    && (tags.category == GENERAL || (*allow_2024_pool && tags.category == YEAR_2024))
            }
        }
    }

    fn fallback(&self) -> Option<RoomPolicy> {
        match self {
            RoomPolicy::Clc2024 => Some(RoomPolicy::ClcAny),
            _ => None,
        }
    }
}

/// Normalised category and note of a room.
struct RoomTags {
    category: String,
    note: String,
}

impl RoomTags {
    fn of(room: &Room) -> Self {
        Self {
            category: room.category.trim().to_lowercase(),
            note: room.note.to_lowercase(),
        }
    }

    fn note_has(&self, token: &str) -> bool {
        self.note
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == token)
    }

    fn notes_english(&self) -> bool {
        self.note_has(ENGLISH) || self.note.contains(ENGLISH_NOTE)
    }

    fn is_clc(&self) -> bool {
        self.category == CLC || self.note_has(CLC)
    }

    fn is_nt(&self) -> bool {
        self.category == NT || self.note_has(NT)
    }

    fn is_english(&self) -> bool {
        self.category == ENGLISH || self.notes_english()
    }
}

/// What one emitted row needs from the catalog.
#[derive(Debug, Clone, Copy)]
pub struct RoomRequest {
    pub capacity: u32,
    pub day: DayOfWeek,
    pub session: Session,
    pub policy: RoomPolicy,
}

/// Picks the smallest free room admitted by the request's policy and reserves it.
///
/// Returns `None` when nothing qualifies; the caller keeps the row without a room.
pub fn pick_room<'a>(
    catalog: &'a [Room],
    request: &RoomRequest,
    session: &mut GenerationSession,
) -> Option<&'a Room> {
    let chosen = smallest_fit(catalog, request, request.policy, session).or_else(|| {
        let relaxed = request.policy.fallback()?;
        trace!(
            "no {:?} room for day {} session {}, relaxing to {:?}",
            request.policy, request.day, request.session, relaxed
        );
        smallest_fit(catalog, request, relaxed, session)
    })?;

    let code = chosen.code.as_deref()?;
    session.reserve(OccupancyKey::new(code, request.day, request.session));
    Some(chosen)
}

fn smallest_fit<'a>(
    catalog: &'a [Room],
    request: &RoomRequest,
    policy: RoomPolicy,
    session: &GenerationSession,
) -> Option<&'a Room> {
    catalog
        .iter()
        .filter(|room| {
            let Some(code) = room.code.as_deref().filter(|c| !c.trim().is_empty()) else {
                return false;
            };
            if session.is_occupied(&OccupancyKey::new(code, request.day, request.session)) {
                return false;
            }
            room.capacity >= request.capacity && policy.admits(room)
        })
        .min_by_key(|room| room.capacity)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;

    pub(crate) fn room(code: &str, capacity: u32, category: &str, note: &str) -> Room {
        Room {
            id: None,
            code: Some(code.to_string()),
            capacity,
            building: Some("A".to_string()),
            category: category.to_string(),
            note: note.to_string(),
        }
    }

    fn request(capacity: u32, policy: RoomPolicy) -> RoomRequest {
        RoomRequest {
            capacity,
            day: 2,
            session: 1,
            policy,
        }
    }

    #[test]
    fn cohort_rules_select_one_policy() {
        use RoomPolicy::*;
        let cases = [
            (("CLC", "2024", ""), Clc2024),
            (("clc", "2023", "english"), ClcOtherYears),
            (("CLC", "2022", ""), ClcOtherYears),
            (("AUN", "2024", ""), Unassigned),
            (("", "2022", "english"), LegacyNt),
            (("", "2023", "English"), English),
            (("", "2024", ""), General { allow_2024_pool: true }),
            (("", "2023", ""), General { allow_2024_pool: false }),
        ];
        for ((program, year, kind), expected) in cases {
            assert_eq!(RoomPolicy::for_cohort(program, year, kind), expected, "{program}/{year}/{kind}");
        }
    }

    #[test]
    fn clc_pools_are_disjoint_by_entry_year() {
        let clc_2024 = room("C1", 50, "clc", "Lớp CLC 2024");
        let clc_old = room("C2", 50, "clc", "phòng clc");
        let clc_by_note = room("C3", 50, "general", "dành cho CLC");

        assert!(RoomPolicy::Clc2024.admits(&clc_2024));
        assert!(!RoomPolicy::Clc2024.admits(&clc_old));
        assert!(!RoomPolicy::ClcOtherYears.admits(&clc_2024));
        assert!(RoomPolicy::ClcOtherYears.admits(&clc_old));
        assert!(RoomPolicy::ClcOtherYears.admits(&clc_by_note));
    }

    #[test]
    fn general_pool_excludes_tagged_rooms() {
        let general = room("G1", 60, "general", "");
        let pool_2024 = room("Y1", 60, "2024", "");
        let nt_noted = room("G2", 60, "general", "phòng NT");
        let english = room("E1", 60, "english", "học tiếng anh");

        let strict = RoomPolicy::General { allow_2024_pool: false };
        let open = RoomPolicy::General { allow_2024_pool: true };
        assert!(strict.admits(&general));
        assert!(!strict.admits(&pool_2024));
        assert!(open.admits(&pool_2024));
        assert!(!open.admits(&nt_noted));
        assert!(!open.admits(&english));
        assert!(RoomPolicy::English.admits(&english));
        assert!(RoomPolicy::LegacyNt.admits(&room("N1", 60, "nt", "khu nt")));
        assert!(!RoomPolicy::LegacyNt.admits(&nt_noted));
    }

    #[test]
    fn picks_smallest_free_room_and_reserves_it() {
        let catalog = vec![
            room("G90", 90, "general", ""),
            room("G40", 40, "general", ""),
            room("G30", 30, "general", ""),
            room("G45", 45, "general", ""),
        ];
        let mut session = GenerationSession::default();
        let req = request(35, RoomPolicy::General { allow_2024_pool: false });

        let first = pick_room(&catalog, &req, &mut session).map(|r| r.code.clone());
        assert_eq!(first, Some(Some("G40".to_string())));
        assert!(session.is_occupied(&OccupancyKey::new("G40", 2, 1)));

        let second = pick_room(&catalog, &req, &mut session).map(|r| r.code.clone());
        assert_eq!(second, Some(Some("G45".to_string())));
        assert_eq!(session.reserved().len(), 2);
    }

    #[test]
    fn committed_rooms_are_never_chosen() {
        let catalog = vec![room("G40", 40, "general", ""), room("G50", 50, "general", "")];
        let committed: HashSet<_> = [OccupancyKey::new("G40", 2, 1)].into_iter().collect();
        let mut session = GenerationSession::initialize(committed, -1);

        let chosen = pick_room(&catalog, &request(30, RoomPolicy::General { allow_2024_pool: false }), &mut session);
        assert_eq!(chosen.and_then(|r| r.code.as_deref()), Some("G50"));
    }

    #[test]
    fn rooms_without_code_are_skipped() {
        let mut codeless = room("X", 40, "general", "");
        codeless.code = None;
        let catalog = vec![codeless];
        let mut session = GenerationSession::default();
        assert!(pick_room(&catalog, &request(10, RoomPolicy::General { allow_2024_pool: false }), &mut session).is_none());
        assert!(session.reserved().is_empty());
    }

    #[test]
    fn clc_2024_falls_back_to_any_clc_room() {
        let catalog = vec![
            room("C2024", 60, "clc", "lớp clc 2024"),
            room("C-OLD", 80, "clc", ""),
            room("G1", 40, "general", ""),
        ];
        let mut session = GenerationSession::default();
        let req = request(50, RoomPolicy::Clc2024);

        let first = pick_room(&catalog, &req, &mut session);
        assert_eq!(first.and_then(|r| r.code.as_deref()), Some("C2024"));
        let second = pick_room(&catalog, &req, &mut session);
        assert_eq!(second.and_then(|r| r.code.as_deref()), Some("C-OLD"));
        assert!(pick_room(&catalog, &req, &mut session).is_none());
    }

    #[test]
    fn other_programs_get_no_room() {
        let catalog = vec![room("G1", 40, "general", ""), room("C1", 40, "clc", "")];
        let mut session = GenerationSession::default();
        assert!(pick_room(&catalog, &request(10, RoomPolicy::Unassigned), &mut session).is_none());
    }
}
