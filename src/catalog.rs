//! Template pools and the room catalog.

use crate::data::{MAX_PERIOD_LENGTH, Room, SEMESTER_WEEKS, TemplateRow};
use crate::error::{SchedulerError, StoreError};
use log::{info, trace, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const ROOMS_FILE: &str = "rooms.json";
pub const TEMPLATE_DIR: &str = "templates";

/// Source of template pools and rooms.
pub trait Catalog: Send + Sync {
    fn load_templates(&self, semester: &str) -> Result<Vec<TemplateRow>, StoreError>;
    fn save_templates(&self, semester: &str, rows: &[TemplateRow]) -> Result<(), StoreError>;
    fn load_rooms(&self) -> Result<Vec<Room>, StoreError>;
    fn save_rooms(&self, rooms: &[Room]) -> Result<(), StoreError>;
}

/// Catalog stored as JSON files under a data directory.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    dir: PathBuf,
}

impl FileCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn template_path(&self, semester: &str) -> PathBuf {
        let file: String = semester
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(TEMPLATE_DIR).join(format!("{}.json", file))
    }

    fn read_list<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_list<T: serde::Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(items)?)?;
        Ok(())
    }
}

impl Catalog for FileCatalog {
    fn load_templates(&self, semester: &str) -> Result<Vec<TemplateRow>, StoreError> {
        Self::read_list(&self.template_path(semester))
    }

    fn save_templates(&self, semester: &str, rows: &[TemplateRow]) -> Result<(), StoreError> {
        Self::write_list(&self.template_path(semester), rows)
    }

    fn load_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Self::read_list(&self.dir.join(ROOMS_FILE))
    }

    fn save_rooms(&self, rooms: &[Room]) -> Result<(), StoreError> {
        Self::write_list(&self.dir.join(ROOMS_FILE), rooms)
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    templates: std::sync::Mutex<HashMap<String, Vec<TemplateRow>>>,
    rooms: std::sync::Mutex<Vec<Room>>,
}

#[cfg(test)]
impl Catalog for MemoryCatalog {
    fn load_templates(&self, semester: &str) -> Result<Vec<TemplateRow>, StoreError> {
        let templates = self.templates.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(templates.get(semester).cloned().unwrap_or_default())
    }

    fn save_templates(&self, semester: &str, rows: &[TemplateRow]) -> Result<(), StoreError> {
        let mut templates = self.templates.lock().map_err(|_| StoreError::LockPoisoned)?;
        templates.insert(semester.to_string(), rows.to_vec());
        Ok(())
    }

    fn load_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.rooms.lock().map_err(|_| StoreError::LockPoisoned)?.clone())
    }

    fn save_rooms(&self, rooms: &[Room]) -> Result<(), StoreError> {
        *self.rooms.lock().map_err(|_| StoreError::LockPoisoned)? = rooms.to_vec();
        Ok(())
    }
}

/// Why the generator cannot interpret `row`, if it cannot.
fn template_problem(row: &TemplateRow) -> Option<String> {
    if row.week_active.len() != SEMESTER_WEEKS {
        Some(format!(
            "weekActive has {} entries, expected {}",
            row.week_active.len(),
            SEMESTER_WEEKS
        ))
    } else if !(2..=7).contains(&row.day_of_week) {
        Some(format!("dayOfWeek {} outside 2..=7", row.day_of_week))
    } else if !(1..=4).contains(&row.session) {
        Some(format!("session {} outside 1..=4", row.session))
    } else if row.period_length > MAX_PERIOD_LENGTH {
        Some(format!(
            "periodLength {} above {}",
            row.period_length, MAX_PERIOD_LENGTH
        ))
    } else {
        None
    }
}

/// Rejects template rows the generator cannot interpret.
pub fn validate_templates(rows: &[TemplateRow]) -> Result<(), SchedulerError> {
    for row in rows {
        if let Some(reason) = template_problem(row) {
            return Err(SchedulerError::InvalidTemplate {
                row_id: row.row_id.clone(),
                reason,
            });
        }
    }
    Ok(())
}

/// Template pools cached per semester, dropped when a semester is re-imported.
pub struct TemplateCache {
    catalog: Arc<dyn Catalog>,
    pools: HashMap<String, Arc<Vec<TemplateRow>>>,
}

impl TemplateCache {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            pools: HashMap::new(),
        }
    }

    pub fn pool(&mut self, semester: &str) -> Result<Arc<Vec<TemplateRow>>, StoreError> {
        if let Some(pool) = self.pools.get(semester) {
            trace!("template cache hit for semester {}", semester);
            return Ok(pool.clone());
        }
        // files may have been edited by hand since import
        let pool: Vec<TemplateRow> = self
            .catalog
            .load_templates(semester)?
            .into_iter()
            .filter(|row| match template_problem(row) {
                Some(reason) => {
                    warn!(
                        "Dropping template row {} of semester {}: {}",
                        row.row_id, semester, reason
                    );
                    false
                }
                None => true,
            })
            .collect();
        let pool = Arc::new(pool);
        // an empty pool is not cached so a later import is picked up
        if !pool.is_empty() {
            self.pools.insert(semester.to_string(), pool.clone());
        }
        Ok(pool)
    }

    /// Replaces a semester's pool after validating it.
    pub fn import(&mut self, semester: &str, rows: Vec<TemplateRow>) -> Result<usize, SchedulerError> {
        validate_templates(&rows)?;
        self.catalog.save_templates(semester, &rows)?;
        self.pools.remove(semester);
        info!("Imported {} template rows for semester {}", rows.len(), semester);
        Ok(rows.len())
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::template;
    use crate::rooms::tests::room;
    use tempfile::tempdir;

    #[test]
    fn validation_rejects_short_week_vectors() {
        let mut row = template(30, 2, 1, 2, 15);
        row.week_active.truncate(17);
        let err = validate_templates(&[row]).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTemplate { .. }));
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn validation_rejects_out_of_range_slots() {
        assert!(validate_templates(&[template(30, 8, 1, 2, 15)]).is_err());
        assert!(validate_templates(&[template(30, 2, 5, 2, 15)]).is_err());
        assert!(validate_templates(&[template(30, 7, 4, 2, 15)]).is_ok());
    }

    #[test]
    fn validation_bounds_period_length() {
        assert!(validate_templates(&[template(30, 2, 1, MAX_PERIOD_LENGTH, 15)]).is_ok());
        let err = validate_templates(&[template(30, 2, 1, 300_000_000, 18)]).unwrap_err();
        assert!(err.to_string().contains("periodLength"));
    }

    #[test]
    fn hand_edited_template_file_loses_only_its_bad_rows() {
        let dir = tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path());
        let mut short_weeks = template(30, 3, 1, 2, 15);
        short_weeks.week_active.truncate(17);
        catalog
            .save_templates(
                "HK1",
                &[template(30, 2, 1, 2, 15), short_weeks, template(30, 9, 1, 2, 15)],
            )
            .unwrap();

        let mut cache = TemplateCache::new(Arc::new(catalog));
        let pool = cache.pool("HK1").unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].day_of_week, 2);
    }

    #[test]
    fn import_invalidates_cached_pool() {
        let mut cache = TemplateCache::new(Arc::new(MemoryCatalog::default()));
        assert!(cache.pool("HK1").unwrap().is_empty());

        cache.import("HK1", vec![template(30, 2, 1, 2, 15)]).unwrap();
        assert_eq!(cache.pool("HK1").unwrap().len(), 1);

        cache
            .import("HK1", vec![template(30, 2, 1, 2, 15), template(45, 3, 1, 3, 15)])
            .unwrap();
        assert_eq!(cache.pool("HK1").unwrap().len(), 2);
        assert!(cache.pool("HK2").unwrap().is_empty());
    }

    #[test]
    fn file_catalog_round_trips() {
        let dir = tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path());
        assert!(catalog.load_rooms().unwrap().is_empty());

        catalog.save_rooms(&[room("A1", 40, "general", "")]).unwrap();
        catalog.save_templates("2024/HK1", &[template(30, 2, 1, 2, 15)]).unwrap();

        assert_eq!(catalog.load_rooms().unwrap().len(), 1);
        assert_eq!(catalog.load_templates("2024/HK1").unwrap().len(), 1);
        assert!(dir.path().join(TEMPLATE_DIR).join("2024_HK1.json").exists());
    }
}
