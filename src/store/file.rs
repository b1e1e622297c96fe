//! File-backed stores: one JSON file for jobs, a directory of entity files

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::errors::{Result, TranslationError};
use crate::core::models::{EntityContent, EntityMeta, JobId, JobStatus, JobUpdate, TranslationJob};
use crate::store::{select_jobs, EntityStore, JobStore, PublishedEntity};

/// Write `contents` next to `path`, then rename over it
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Job store persisted as a JSON array, rewritten on every change
#[derive(Debug, Clone)]
pub struct FileJobStore {
    path: PathBuf,
    jobs: Arc<Mutex<HashMap<JobId, TranslationJob>>>,
}

impl FileJobStore {
    /// Open the store, loading existing jobs when the file exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let jobs = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => {
                let list: Vec<TranslationJob> = serde_json::from_str(&content)?;
                list.into_iter().map(|job| (job.id, job)).collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!("Opened job store {} ({} jobs)", path.display(), jobs.len());

        Ok(Self {
            path,
            jobs: Arc::new(Mutex::new(jobs)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, jobs: &HashMap<JobId, TranslationJob>) -> Result<()> {
        let ordered = select_jobs(jobs.values(), &[]);
        let content = serde_json::to_vec_pretty(&ordered)?;
        write_atomic(&self.path, &content).await
    }

    /// Write `next` to disk, then adopt it in memory. A failed write leaves
    /// `current` as it was.
    async fn commit(
        &self,
        current: &mut HashMap<JobId, TranslationJob>,
        next: HashMap<JobId, TranslationJob>,
    ) -> Result<()> {
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &TranslationJob) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let mut next = jobs.clone();
        next.insert(job.id, job.clone());
        self.commit(&mut jobs, next).await
    }

    async fn get(&self, id: JobId) -> Result<Option<TranslationJob>> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> Result<TranslationJob> {
        let mut jobs = self.jobs.lock().await;
        let mut next = jobs.clone();
        let job = next
            .get_mut(&id)
            .ok_or(TranslationError::JobNotFound { job_id: id })?;
        update.apply(job);
        let updated = job.clone();
        self.commit(&mut jobs, next).await?;
        Ok(updated)
    }

    async fn list(&self, statuses: &[JobStatus]) -> Result<Vec<TranslationJob>> {
        let jobs = self.jobs.lock().await;
        Ok(select_jobs(jobs.values(), statuses))
    }

    async fn delete(&self, id: JobId) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        if !jobs.contains_key(&id) {
            return Ok(false);
        }
        let mut next = jobs.clone();
        next.remove(&id);
        self.commit(&mut jobs, next).await?;
        Ok(true)
    }
}

/// Entities stored as `<dir>/<id>.json`; translations go to `<dir>/published/`
#[derive(Debug, Clone)]
pub struct FsEntityStore {
    dir: PathBuf,
}

impl FsEntityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn checked_id<'a>(&self, entity_id: &'a str) -> Result<&'a str> {
        let valid = !entity_id.is_empty()
            && entity_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(entity_id)
        } else {
            Err(TranslationError::StoreError {
                message: format!("invalid entity id: {:?}", entity_id),
            })
        }
    }

    fn entity_path(&self, entity_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", entity_id))
    }

    pub fn published_path(&self, published_id: &str) -> PathBuf {
        self.dir.join("published").join(format!("{}.json", published_id))
    }

    /// Write a source entity
    pub async fn save(&self, entity_id: &str, content: &EntityContent) -> Result<()> {
        let entity_id = self.checked_id(entity_id)?;
        let json = serde_json::to_vec_pretty(content)?;
        write_atomic(&self.entity_path(entity_id), &json).await
    }
}

#[async_trait]
impl EntityStore for FsEntityStore {
    async fn fetch(&self, entity_id: &str) -> Result<Option<EntityContent>> {
        let entity_id = self.checked_id(entity_id)?;
        match tokio::fs::read_to_string(self.entity_path(entity_id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(
        &self,
        entity_id: &str,
        language: &str,
        title: &str,
        content: &str,
        meta: &EntityMeta,
    ) -> Result<String> {
        let entity_id = self.checked_id(entity_id)?;
        let language = self.checked_id(language)?;
        let entity = PublishedEntity::new(entity_id, language, title, content, meta);
        let path = self.published_path(&entity.published_id);
        write_atomic(&path, &serde_json::to_vec_pretty(&entity)?).await?;
        debug!("Published {} to {}", entity.published_id, path.display());
        Ok(entity.published_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_jobs_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("jobs.json");

        let store = FileJobStore::open(&path).await.unwrap();
        let job = TranslationJob::new("12", "en", "fr");
        store.create(&job).await.unwrap();
        store
            .update(job.id, JobUpdate::status(JobStatus::Processing).with_progress(30))
            .await
            .unwrap();

        let reopened = FileJobStore::open(&path).await.unwrap();
        let loaded = reopened.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert_eq!(loaded.progress, 30);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_deleted_job_update_fails() {
        let dir = tempdir().unwrap();
        let store = FileJobStore::open(dir.path().join("jobs.json")).await.unwrap();
        let job = TranslationJob::new("12", "en", "fr");
        store.create(&job).await.unwrap();
        assert!(store.delete(job.id).await.unwrap());

        let result = store.update(job.id, JobUpdate::progress(50)).await;
        assert!(matches!(result, Err(TranslationError::JobNotFound { .. })));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_memory_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = FileJobStore::open(&path).await.unwrap();
        let job = TranslationJob::new("12", "en", "fr");
        store.create(&job).await.unwrap();

        // A directory where the temp file goes makes every write fail
        let blocker = path.with_extension("json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let result = store
            .update(job.id, JobUpdate::status(JobStatus::Processing).with_progress(30))
            .await;
        assert!(result.is_err());
        let current = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Pending);
        assert_eq!(current.progress, 0);

        assert!(store.delete(job.id).await.is_err());
        assert!(store.get(job.id).await.unwrap().is_some());
        let other = TranslationJob::new("13", "en", "fr");
        assert!(store.create(&other).await.is_err());
        assert!(store.get(other.id).await.unwrap().is_none());

        std::fs::remove_dir(&blocker).unwrap();
        let updated = store.update(job.id, JobUpdate::progress(30)).await.unwrap();
        assert_eq!(updated.progress, 30);
    }

    #[tokio::test]
    async fn test_entity_fetch_and_publish() {
        let dir = tempdir().unwrap();
        let store = FsEntityStore::new(dir.path());
        let mut meta = EntityMeta::new();
        meta.insert("_edit_lock".to_string(), "1700000000:1".to_string());
        let entity = EntityContent {
            title: "About".to_string(),
            raw_content: "<p>Hello</p>".to_string(),
            meta: meta.clone(),
        };
        store.save("about-us", &entity).await.unwrap();

        assert_eq!(store.fetch("about-us").await.unwrap(), Some(entity));
        assert_eq!(store.fetch("missing").await.unwrap(), None);

        let id = store
            .publish("about-us", "fr", "À propos", "<p>Bonjour</p>", &meta)
            .await
            .unwrap();
        assert_eq!(id, "about-us-fr");

        let written = std::fs::read_to_string(store.published_path(&id)).unwrap();
        let published: PublishedEntity = serde_json::from_str(&written).unwrap();
        assert_eq!(published.content, "<p>Bonjour</p>");
        assert_eq!(published.meta, meta);
    }

    #[tokio::test]
    async fn test_entity_id_cannot_escape_dir() {
        let dir = tempdir().unwrap();
        let store = FsEntityStore::new(dir.path());
        let result = store.fetch("../secrets").await;
        assert!(matches!(result, Err(TranslationError::StoreError { .. })));
    }
}
