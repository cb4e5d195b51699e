use crate::catalog::{Catalog, FileCatalog, TemplateCache};
use crate::config::ServiceConfig;
use crate::data::{
    BatchRequest, BatchResult, LedgerInfo, LedgerUpdate, Room, ScheduleRow, ScopedCommitRequest,
    SubjectResult, SubjectScheduleRequest, TemplateRow, UserScope,
};
use crate::error::{SchedulerError, StoreError};
use crate::generator::{self, PlannedRow};
use crate::ledger::{GenerationSession, OccupancyKey};
use crate::rooms::{self, RoomPolicy, RoomRequest};
use crate::rotation::{CYCLE_LEN, RESET_CURSOR};
use crate::store::{
    FileKvStore, FileLedgerStore, KeyValueStore, LedgerStore, MemoryKvStore, ScopedLedgerStore,
};
use itertools::Itertools;
use log::{error, info, trace, warn};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

pub const KV_FILE: &str = "kv_store.json";

/// Timetable generation service.
///
/// Holds the pending session of the last global generation until it is
/// committed, reset, or replaced by the next generation.
pub struct Scheduler {
    templates: TemplateCache,
    ledger: Arc<dyn LedgerStore>,
    kv: Arc<dyn KeyValueStore>,
    iteration_cap: usize,
    pending: Option<GenerationSession>,
}

impl Scheduler {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn LedgerStore>,
        kv: Arc<dyn KeyValueStore>,
        iteration_cap: usize,
    ) -> Self {
        Self {
            templates: TemplateCache::new(catalog),
            ledger,
            kv,
            iteration_cap,
            pending: None,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, StoreError> {
        let kv: Arc<dyn KeyValueStore> = if config.memory_kv {
            Arc::new(MemoryKvStore::default())
        } else {
            Arc::new(FileKvStore::open(config.data_dir.join(KV_FILE))?)
        };
        Ok(Self::new(
            Arc::new(FileCatalog::new(&config.data_dir)),
            Arc::new(FileLedgerStore::new(&config.data_dir)),
            kv,
            config.iteration_cap,
        ))
    }

    /// Fresh session over the committed baseline; the previous pending session is discarded.
    pub fn initialize_run(&mut self) -> GenerationSession {
        self.pending = None;
        GenerationSession::initialize(self.ledger.committed_or_empty(), self.ledger.cursor_or_reset())
    }

    /// Generates a batch. Global batches stay pending until [`Scheduler::commit`];
    /// scoped batches write their reservations and cursor straight into the scope's ledger.
    pub fn generate(&mut self, batch: &BatchRequest) -> Result<BatchResult, SchedulerError> {
        if batch.subjects.is_empty() {
            return Err(SchedulerError::EmptyBatch);
        }
        match &batch.scope {
            Some(scope) => Ok(self.generate_scoped(batch, scope)),
            None => {
                let mut session = self.initialize_run();
                let result = self.run(batch, &mut session);
                self.pending = Some(session);
                Ok(result)
            }
        }
    }

    fn generate_scoped(&mut self, batch: &BatchRequest, scope: &UserScope) -> BatchResult {
        let store = ScopedLedgerStore::new(self.kv.clone(), scope);
        let mut session =
            GenerationSession::initialize(store.committed_or_empty(), store.cursor_or_reset());
        let result = self.run(batch, &mut session);

        if let Err(e) = store.save_cursor(session.cursor()) {
            error!("Failed to save cursor for scope {}: {}", scope, e);
        }
        if session.reserved().is_empty() {
            return result;
        }
        // an unreadable stored set is left alone rather than replaced by this run alone
        match store.load_committed() {
            Ok(mut committed) => {
                committed.extend(session.into_reserved());
                if let Err(e) = store.save_committed(&committed) {
                    error!("Failed to save occupancy for scope {}: {}", scope, e);
                }
            }
            Err(e) => error!(
                "Failed to reload occupancy for scope {}, {} reservations not saved: {}",
                scope,
                session.reserved().len(),
                e
            ),
        }
        result
    }

    fn run(&mut self, batch: &BatchRequest, session: &mut GenerationSession) -> BatchResult {
        let start_time = Instant::now();
        let pool = self.templates.pool(&batch.semester).unwrap_or_else(|e| {
            error!("Failed to load templates for semester {}: {}", batch.semester, e);
            Arc::new(Vec::new())
        });
        if pool.is_empty() {
            warn!("No template data for semester {}", batch.semester);
            return BatchResult::no_data(
                format!("no template data for semester {}", batch.semester),
                session.cursor(),
            );
        }
        let rooms = self.templates.catalog().load_rooms().unwrap_or_else(|e| {
            error!("Failed to load room catalog: {}", e);
            Vec::new()
        });

        info!(
            "Generating {} subjects for semester {} from cursor {} ({} template rows, {} rooms)",
            batch.subjects.len(),
            batch.semester,
            session.cursor(),
            pool.len(),
            rooms.len()
        );

        let subjects: Vec<SubjectResult> = priority_order(&batch.subjects)
            .into_iter()
            .map(|subject| schedule_subject(&pool, &rooms, subject, session, self.iteration_cap))
            .collect();

        let total_rows = subjects.iter().map(|s| s.rows.len()).sum();
        let total_classes = subjects.iter().map(|s| s.classes_placed).sum();
        info!(
            "Generated {} rows for {} classes in {:.2?}; cursor now {}, {} rooms reserved",
            total_rows,
            total_classes,
            start_time.elapsed(),
            session.cursor(),
            session.reserved().len()
        );

        BatchResult {
            success: true,
            message: None,
            subjects,
            total_rows,
            total_classes,
            session_cursor: session.cursor(),
            rooms_reserved: session.reserved().len(),
        }
    }

    /// Merges the pending session into the committed ledger and persists the cursor.
    pub fn commit(&mut self) -> LedgerUpdate {
        let Some(session) = self.pending.take() else {
            trace!("Commit with no pending session");
            return LedgerUpdate {
                committed: self.ledger.committed_or_empty().len(),
                cursor: self.ledger.cursor_or_reset(),
                persisted: true,
            };
        };

        // re-read so commits from another process since the run started are kept
        let mut committed = self.ledger.load_committed().unwrap_or_else(|e| {
            error!("Failed to reload committed occupancy, merging onto run baseline: {}", e);
            session.committed().clone()
        });
        let cursor = session.cursor();
        committed.extend(session.into_reserved());

        let persisted = persist(self.ledger.as_ref(), &committed, cursor);
        let update = LedgerUpdate {
            committed: committed.len(),
            cursor,
            persisted,
        };
        info!("Committed: {}", update);
        update
    }

    /// Clears the pending session, the committed ledger and the cursor.
    pub fn reset(&mut self) -> LedgerUpdate {
        self.pending = None;
        let persisted = persist(self.ledger.as_ref(), &HashSet::new(), RESET_CURSOR);
        let update = LedgerUpdate {
            committed: 0,
            cursor: RESET_CURSOR,
            persisted,
        };
        info!("Reset: {}", update);
        update
    }

    pub fn info(&self) -> LedgerInfo {
        let committed = self.ledger.committed_or_empty();
        let cursor = self.ledger.cursor_or_reset();
        match &self.pending {
            Some(session) => session.info(&committed, cursor),
            None => LedgerInfo {
                session_only: 0,
                committed: committed.len(),
                total: committed.len(),
                committed_cursor: cursor,
                session_cursor: None,
            },
        }
    }

    /// Overrides the stored cursor of a scope.
    pub fn commit_scoped(&mut self, request: &ScopedCommitRequest) -> Result<LedgerUpdate, SchedulerError> {
        if !(RESET_CURSOR..CYCLE_LEN as i32).contains(&request.cursor) {
            return Err(SchedulerError::InvalidCursor(request.cursor));
        }
        let store = ScopedLedgerStore::new(self.kv.clone(), &request.scope);
        let persisted = match store.save_cursor(request.cursor) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to save cursor for scope {}: {}", request.scope, e);
                false
            }
        };
        Ok(LedgerUpdate {
            committed: store.committed_or_empty().len(),
            cursor: request.cursor,
            persisted,
        })
    }

    pub fn reset_scoped(&mut self, scope: &UserScope) -> LedgerUpdate {
        let store = ScopedLedgerStore::new(self.kv.clone(), scope);
        let persisted = match store.clear() {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to reset scope {}: {}", scope, e);
                false
            }
        };
        info!("Reset scope {}", scope);
        LedgerUpdate {
            committed: 0,
            cursor: RESET_CURSOR,
            persisted,
        }
    }

    pub fn import_templates(&mut self, semester: &str, rows: Vec<TemplateRow>) -> Result<usize, SchedulerError> {
        self.templates.import(semester, rows)
    }

    pub fn import_rooms(&mut self, rooms: Vec<Room>) -> Result<usize, SchedulerError> {
        if let Some(code) = rooms
            .iter()
            .filter_map(|r| r.code.as_deref())
            .duplicates()
            .next()
        {
            return Err(SchedulerError::InvalidRoom(format!("duplicate room code {}", code)));
        }
        self.templates.catalog().save_rooms(&rooms)?;
        info!("Imported {} rooms", rooms.len());
        Ok(rooms.len())
    }
}

fn persist(ledger: &dyn LedgerStore, committed: &HashSet<OccupancyKey>, cursor: i32) -> bool {
    let mut persisted = true;
    if let Err(e) = ledger.save_committed(committed) {
        error!("Failed to save committed occupancy: {}", e);
        persisted = false;
    }
    if let Err(e) = ledger.save_cursor(cursor) {
        error!("Failed to save rotation cursor: {}", e);
        persisted = false;
    }
    persisted
}

/// Special-program subjects first, then larger hours categories, otherwise request order.
fn priority_order(subjects: &[SubjectScheduleRequest]) -> Vec<&SubjectScheduleRequest> {
    subjects
        .iter()
        .sorted_by_key(|s| (s.special_program.trim().is_empty(), Reverse(s.total_hours)))
        .collect()
}

fn empty_result(subject: &SubjectScheduleRequest, note: String) -> SubjectResult {
    SubjectResult {
        subject_code: subject.subject_code.clone(),
        subject_name: subject.subject_name.clone(),
        classes_placed: 0,
        rows: Vec::new(),
        note: Some(note),
    }
}

/// Places every class of one subject and assigns rooms to its rows.
pub fn schedule_subject(
    templates: &[TemplateRow],
    rooms: &[Room],
    subject: &SubjectScheduleRequest,
    session: &mut GenerationSession,
    iteration_cap: usize,
) -> SubjectResult {
    if subject.classes == 0 || subject.total_hours == 0 {
        return empty_result(subject, "no classes or hours requested".to_string());
    }
    let pool = generator::category_pool(templates, subject.total_hours);
    if pool.is_empty() {
        warn!(
            "{}: no template data for category {}",
            subject.subject_code, subject.total_hours
        );
        return empty_result(
            subject,
            format!("no template data for category {}", subject.total_hours),
        );
    }

    let plan = generator::plan_subject(&pool, subject, session.cursor(), iteration_cap);
    session.set_cursor(plan.next_cursor);

    let policy = RoomPolicy::for_subject(subject);
    let mut rows = Vec::new();
    let mut unroomed = 0;
    for section in &plan.sections {
        for planned in &section.rows {
            let room = if planned.template.needs_room() {
                let request = RoomRequest {
                    capacity: subject.students_per_class,
                    day: planned.template.day_of_week,
                    session: planned.template.session,
                    policy,
                };
                let room = rooms::pick_room(rooms, &request, session);
                if room.is_none() {
                    unroomed += 1;
                }
                room
            } else {
                None
            };
            rows.push(schedule_row(subject, section.class_number, planned, room));
        }
    }

    let mut notes = plan.notes;
    if unroomed > 0 {
        notes.push(format!("{} rows without an eligible room", unroomed));
    }
    trace!(
        "{}: {} classes, {} rows, cursor {}",
        subject.subject_code,
        plan.sections.len(),
        rows.len(),
        session.cursor()
    );

    SubjectResult {
        subject_code: subject.subject_code.clone(),
        subject_name: subject.subject_name.clone(),
        classes_placed: plan.sections.len() as u32,
        rows,
        note: (!notes.is_empty()).then(|| notes.join("; ")),
    }
}

fn schedule_row(
    subject: &SubjectScheduleRequest,
    class_number: u32,
    planned: &PlannedRow,
    room: Option<&Room>,
) -> ScheduleRow {
    let template = planned.template;
    ScheduleRow {
        class_number,
        day_of_week: template.day_of_week,
        session: template.session,
        start_period: template.start_period,
        period_length: template.period_length,
        room_code: room.and_then(|r| r.code.clone()),
        building: room.and_then(|r| r.building.clone()),
        hours_before: planned.hours_before,
        hours_after: planned.hours_after,
        week_active: template.week_active.clone(),
        template_row_id: template.row_id.clone(),
        subject_code: subject.subject_code.clone(),
        subject_name: subject.subject_name.clone(),
        total_hours: subject.total_hours,
        students_per_class: subject.students_per_class,
        cohort_year: subject.cohort_year.clone(),
        special_program: subject.special_program.clone(),
        major: subject.major.clone(),
        subject_type: subject.subject_type.clone(),
    }
}
