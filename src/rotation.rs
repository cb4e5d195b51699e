//! The two cyclic slot sequences and the rotation cursor arithmetic.
//!
//! The cursor names the last regular slot fully consumed (`-1` when unused).
//! Every subject starts at the slot after the cursor; sections of the same
//! subject share rotation steps two at a time (four at a time for the
//! 14-hour category).

use crate::data::{DayOfWeek, Hours, Session};

pub const CYCLE_LEN: usize = 12;
pub const RESET_CURSOR: i32 = -1;

/// Hours category whose sections share a rotation step four at a time.
pub const FOUR_PER_STEP_HOURS: Hours = 14;
/// Whole-semester intensive category, scheduled on day pairs.
pub const PAIRED_DAY_HOURS: Hours = 60;

/// A weekday with the sessions of one half-day block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegularSlot {
    pub day: DayOfWeek,
    pub sessions: [Session; 2],
}

impl RegularSlot {
    pub fn admits(&self, day: DayOfWeek, session: Session) -> bool {
        self.day == day && self.sessions.contains(&session)
    }
}

/// Two weekdays sharing one session, used by the 60-hour category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairedSlot {
    pub days: [DayOfWeek; 2],
    pub session: Session,
}

const fn regular(day: DayOfWeek, first: Session) -> RegularSlot {
    RegularSlot {
        day,
        sessions: [first, first + 1],
    }
}

const fn paired(a: DayOfWeek, b: DayOfWeek, session: Session) -> PairedSlot {
    PairedSlot {
        days: [a, b],
        session,
    }
}

pub const REGULAR_SEQUENCE: [RegularSlot; CYCLE_LEN] = [
    regular(2, 1),
    regular(3, 1),
    regular(4, 1),
    regular(5, 1),
    regular(6, 1),
    regular(7, 1),
    regular(2, 3),
    regular(3, 3),
    regular(4, 3),
    regular(5, 3),
    regular(6, 3),
    regular(7, 3),
];

pub const PAIRED_SEQUENCE: [PairedSlot; CYCLE_LEN] = [
    paired(2, 5, 1),
    paired(2, 5, 2),
    paired(2, 5, 3),
    paired(2, 5, 4),
    paired(3, 6, 1),
    paired(3, 6, 2),
    paired(3, 6, 3),
    paired(3, 6, 4),
    paired(4, 7, 1),
    paired(4, 7, 2),
    paired(4, 7, 3),
    paired(4, 7, 4),
];

pub fn next_regular_slot(cursor: i32) -> usize {
    (cursor + 1).rem_euclid(CYCLE_LEN as i32) as usize
}

fn sections_per_step(hours: Hours) -> u32 {
    if hours == FOUR_PER_STEP_HOURS { 4 } else { 2 }
}

/// Slot of the 1-indexed section `class_number` of a subject starting at `start`.
pub fn section_slot(start: usize, hours: Hours, class_number: u32) -> usize {
    let offset = (class_number.saturating_sub(1) / sections_per_step(hours)) as usize;
    (start + offset) % CYCLE_LEN
}

/// Cursor value after placing `classes` sections from `start`.
pub fn advance_cursor(start: usize, hours: Hours, classes: u32) -> i32 {
    section_slot(start, hours, classes.max(1)) as i32
}

/// Starting index in [`PAIRED_SEQUENCE`] derived from the regular cursor.
pub fn paired_start(cursor: i32) -> usize {
    if cursor < 0 {
        return 0;
    }
    let pair_index = cursor as usize / 2 + 1;
    (pair_index * 4) % CYCLE_LEN
}
