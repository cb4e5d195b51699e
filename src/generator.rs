//! Turns a subject request into per-section template row plans.
//!
//! Rooms are not chosen here: a section is planned completely before any
//! room is reserved for it, so an abandoned section leaves no trace in the
//! occupancy ledger.

use crate::data::{DayOfWeek, Hours, Session, SubjectScheduleRequest, TemplateRow};
use crate::rotation::{
    self, CYCLE_LEN, PAIRED_DAY_HOURS, PAIRED_SEQUENCE, REGULAR_SEQUENCE, RegularSlot,
};
use itertools::Itertools;
use log::{trace, warn};
use std::collections::HashMap;

/// Hard bound on pool scans while accumulating one section's hours.
pub const DEFAULT_ITERATION_CAP: usize = 10_000;

/// A template row chosen for a section, with the hours still owed before and after it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedRow<'a> {
    pub template: &'a TemplateRow,
    pub hours_before: i64,
    pub hours_after: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionPlan<'a> {
    pub class_number: u32,
    pub rows: Vec<PlannedRow<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectPlan<'a> {
    pub sections: Vec<SectionPlan<'a>>,
    pub next_cursor: i32,
    pub notes: Vec<String>,
}

/// Iteration cap hit while accumulating hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Exhausted;

/// Rows of the template pool belonging to one hours category.
pub fn category_pool(templates: &[TemplateRow], hours: Hours) -> Vec<&TemplateRow> {
    templates
        .iter()
        .filter(|row| row.total_periods_category == hours)
        .collect()
}

/// Circular position in a subject's pool, shared across all its sections.
#[derive(Debug, Default)]
struct PoolCursor {
    position: usize,
}

impl PoolCursor {
    /// Next row matching `slot`, or the row under the cursor when nothing matches.
    fn take<'a>(&mut self, pool: &[&'a TemplateRow], slot: &RegularSlot) -> &'a TemplateRow {
        let len = pool.len();
        let chosen = (0..len)
            .map(|step| (self.position + step) % len)
            .find(|&idx| slot.admits(pool[idx].day_of_week, pool[idx].session))
            .unwrap_or(self.position % len);
        self.position = (chosen + 1) % len;
        pool[chosen]
    }
}

/// Plans every section of `request` against its category pool.
///
/// `pool` must already be filtered with [`category_pool`] and be non-empty.
pub fn plan_subject<'a>(
    pool: &[&'a TemplateRow],
    request: &SubjectScheduleRequest,
    cursor: i32,
    iteration_cap: usize,
) -> SubjectPlan<'a> {
    if request.total_hours == PAIRED_DAY_HOURS {
        plan_paired(pool, request, cursor)
    } else {
        plan_regular(pool, request, cursor, iteration_cap)
    }
}

fn plan_regular<'a>(
    pool: &[&'a TemplateRow],
    request: &SubjectScheduleRequest,
    cursor: i32,
    iteration_cap: usize,
) -> SubjectPlan<'a> {
    let hours = request.total_hours;
    let start = rotation::next_regular_slot(cursor);
    let mut pool_cursor = PoolCursor::default();
    let mut sections = Vec::new();
    let mut notes = Vec::new();

    for class_number in 1..=request.classes {
        let slot = &REGULAR_SEQUENCE[rotation::section_slot(start, hours, class_number)];
        match accumulate(pool, &mut pool_cursor, slot, hours, iteration_cap) {
            Ok(rows) => {
                trace!(
                    "{} class {}: {} rows on day {} sessions {:?}",
                    request.subject_code,
                    class_number,
                    rows.len(),
                    slot.day,
                    slot.sessions
                );
                sections.push(SectionPlan { class_number, rows });
            }
            Err(Exhausted) => {
                warn!(
                    "{} class {}: iteration cap {} reached, abandoning remaining classes",
                    request.subject_code, class_number, iteration_cap
                );
                notes.push(format!(
                    "iteration cap reached at class {}; classes {}..={} not scheduled",
                    class_number, class_number, request.classes
                ));
                break;
            }
        }
    }

    SubjectPlan {
        sections,
        next_cursor: rotation::advance_cursor(start, hours, request.classes),
        notes,
    }
}

fn accumulate<'a>(
    pool: &[&'a TemplateRow],
    pool_cursor: &mut PoolCursor,
    slot: &RegularSlot,
    hours: Hours,
    iteration_cap: usize,
) -> Result<Vec<PlannedRow<'a>>, Exhausted> {
    let mut remaining = i64::from(hours);
    let mut rows = Vec::new();
    let mut iterations = 0;

    while remaining > 0 {
        if iterations >= iteration_cap {
            return Err(Exhausted);
        }
        iterations += 1;

        let template = pool_cursor.take(pool, slot);
        let usable = template.usable_hours();
        if usable == 0 {
            continue;
        }
        rows.push(PlannedRow {
            template,
            hours_before: remaining,
            hours_after: remaining - usable,
        });
        remaining -= usable;
    }
    Ok(rows)
}

fn plan_paired<'a>(
    pool: &[&'a TemplateRow],
    request: &SubjectScheduleRequest,
    cursor: i32,
) -> SubjectPlan<'a> {
    let groups: HashMap<(DayOfWeek, Session), Vec<&'a TemplateRow>> = pool
        .iter()
        .map(|row| ((row.day_of_week, row.session), *row))
        .into_group_map();
    let start = rotation::paired_start(cursor);
    let mut sections = Vec::new();
    let mut notes = Vec::new();

    for class_number in 1..=request.classes {
        let slot = &PAIRED_SEQUENCE[(start + class_number as usize - 1) % CYCLE_LEN];
        let mut remaining = i64::from(request.total_hours);
        let mut rows = Vec::new();

        for day in slot.days {
            let Some(group) = groups.get(&(day, slot.session)) else {
                continue;
            };
            for template in group.iter().copied().filter(|row| row.usable_hours() > 0) {
                let usable = template.usable_hours();
                rows.push(PlannedRow {
                    template,
                    hours_before: remaining,
                    hours_after: remaining - usable,
                });
                remaining -= usable;
            }
        }

        if rows.is_empty() {
            notes.push(format!(
                "class {}: no template rows for days {:?} session {}",
                class_number, slot.days, slot.session
            ));
            continue;
        }
        sections.push(SectionPlan { class_number, rows });
    }

    SubjectPlan {
        sections,
        next_cursor: rotation::next_regular_slot(cursor) as i32,
        notes,
    }
}
