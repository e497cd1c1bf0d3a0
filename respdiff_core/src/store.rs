use respdiff_common::{ComparisonRecord, RecordId, RespDiffError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Where finished comparisons are kept.
///
/// Implementations must make a record visible completely or not at all.
pub trait ComparisonStore: Send + Sync {
    fn save(&self, record: &ComparisonRecord) -> Result<RecordId, RespDiffError>;

    fn get(&self, id: RecordId) -> Result<Option<ComparisonRecord>, RespDiffError>;

    /// Most recent records first
    fn list_recent(&self, limit: usize) -> Result<Vec<ComparisonRecord>, RespDiffError>;

    fn latest(&self) -> Result<Option<ComparisonRecord>, RespDiffError> {
        Ok(self.list_recent(1)?.into_iter().next())
    }
}

/// Lock-guarded in-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<ComparisonRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComparisonStore for MemoryStore {
    fn save(&self, record: &ComparisonRecord) -> Result<RecordId, RespDiffError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| RespDiffError::Persistence(format!("Lock error: {}", e)))?;
        records.push(record.clone());
        Ok(record.id)
    }

    fn get(&self, id: RecordId) -> Result<Option<ComparisonRecord>, RespDiffError> {
        let records = self
            .records
            .read()
            .map_err(|e| RespDiffError::Persistence(format!("Lock error: {}", e)))?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<ComparisonRecord>, RespDiffError> {
        let records = self
            .records
            .read()
            .map_err(|e| RespDiffError::Persistence(format!("Lock error: {}", e)))?;
        let mut recent: Vec<ComparisonRecord> = records.clone();
        sort_newest_first(&mut recent);
        recent.truncate(limit);
        Ok(recent)
    }
}

/// One JSON document per record under `<data_dir>/comparisons/`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: &Path) -> Result<Self, RespDiffError> {
        let dir = data_dir.join("comparisons");
        fs::create_dir_all(&dir)
            .map_err(|e| RespDiffError::Persistence(format!("Cannot create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn read_record(path: &Path) -> Result<ComparisonRecord, RespDiffError> {
        let data = fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| RespDiffError::Serialization(e.to_string()))
    }
}

impl ComparisonStore for FileStore {
    fn save(&self, record: &ComparisonRecord) -> Result<RecordId, RespDiffError> {
        let path = self.record_path(record.id);
        let temp_file = self.dir.join(format!(".{}.json.tmp", record.id));

        let data = serde_json::to_vec_pretty(record)
            .map_err(|e| RespDiffError::Serialization(e.to_string()))?;

        // Readers only ever see the renamed, complete file
        fs::write(&temp_file, data)
            .map_err(|e| RespDiffError::Persistence(format!("Cannot write {}: {}", temp_file.display(), e)))?;
        if let Err(e) = fs::rename(&temp_file, &path) {
            let _ = fs::remove_file(&temp_file);
            return Err(RespDiffError::Persistence(format!(
                "Cannot move record into place at {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Saved comparison {} to {}", record.id, path.display());
        Ok(record.id)
    }

    fn get(&self, id: RecordId) -> Result<Option<ComparisonRecord>, RespDiffError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<ComparisonRecord>, RespDiffError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }

        sort_newest_first(&mut records);
        records.truncate(limit);
        Ok(records)
    }
}

fn sort_newest_first(records: &mut [ComparisonRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
