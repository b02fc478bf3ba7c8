//! Job table with persistence and background execution
//!
//! Every mutation is applied to a copy of the table, written to the JSON
//! file and only then swapped in, all under the table lock. A failed write
//! leaves both the table and the id counter untouched. Ids are never reused
//! within a run, and `u64::MAX` is never handed out.

use crate::job::{Job, JobStatus};
use crate::machine::MachineRegistry;
use cellkit_core::{JobError, Result};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct JobsManager {
    path: Option<PathBuf>,
    jobs: RwLock<BTreeMap<u64, Job>>,
    next_id: AtomicU64,
}

impl JobsManager {
    /// In-memory table with no backing file
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the job file at `path`
    ///
    /// A missing or unreadable file starts an empty table; the file is
    /// created on the first mutation.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let jobs = match Self::read_file(&path) {
            Ok(jobs) => {
                tracing::info!("Loaded {} jobs from {}", jobs.len(), path.display());
                jobs
            }
            Err(e) => {
                tracing::warn!("Starting with no jobs, {} unusable: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        let next_id = jobs.keys().next_back().map_or(0, |id| id.saturating_add(1));
        Self {
            path: Some(path),
            jobs: RwLock::new(jobs),
            next_id: AtomicU64::new(next_id),
        }
    }

    fn read_file(path: &Path) -> Result<BTreeMap<u64, Job>> {
        let content = std::fs::read_to_string(path)?;
        let jobs: BTreeMap<u64, Job> = serde_json::from_str(&content)?;
        // keys win over any stale id inside a record
        Ok(jobs
            .into_iter()
            .map(|(id, mut job)| {
                job.id = id;
                (id, job)
            })
            .collect())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, jobs: &BTreeMap<u64, Job>) -> Result<()> {
        if let Some(path) = &self.path {
            std::fs::write(path, serde_json::to_string_pretty(jobs)?)?;
            tracing::debug!("Saved {} jobs to {}", jobs.len(), path.display());
        }
        Ok(())
    }

    fn mutate<T>(&self, change: impl FnOnce(&mut BTreeMap<u64, Job>) -> Result<T>) -> Result<T> {
        let mut jobs = self.jobs.write();
        let mut next = jobs.clone();
        let out = change(&mut next)?;
        self.persist(&next)?;
        *jobs = next;
        Ok(out)
    }

    /// Create a job from the default template and return its id
    pub fn add_job(&self) -> Result<u64> {
        let id = self.mutate(|jobs| {
            let mut id = self.next_id.load(Ordering::SeqCst);
            while jobs.contains_key(&id) {
                id = id.saturating_add(1);
                if id == u64::MAX {
                    break;
                }
            }
            if id == u64::MAX {
                return Err(JobError::IdOutOfRange { id }.into());
            }
            jobs.insert(id, Job::template(id));
            Ok(id)
        })?;
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        tracing::info!("Added job {}", id);
        Ok(id)
    }

    /// Insert or replace a job by its id
    pub fn update_job(&self, mut job: Job) -> Result<u64> {
        let id = job.id;
        let successor = match id.checked_add(1) {
            Some(n) => n,
            None => return Err(JobError::IdOutOfRange { id }.into()),
        };
        job.updated_at = chrono::Utc::now();
        self.mutate(|jobs| {
            jobs.insert(id, job);
            Ok(())
        })?;
        self.next_id.fetch_max(successor, Ordering::SeqCst);
        Ok(id)
    }

    /// Remove a job; false when no job has this id
    pub fn delete_job(&self, id: u64) -> Result<bool> {
        let removed = self.mutate(|jobs| Ok(jobs.remove(&id).is_some()))?;
        if removed {
            tracing::info!("Deleted job {}", id);
        }
        Ok(removed)
    }

    pub fn get_job(&self, id: u64) -> Result<Job> {
        self.jobs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| JobError::UnknownJob { id }.into())
    }

    pub fn get_jobs(&self) -> BTreeMap<u64, Job> {
        self.jobs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Canonical parameters for `action` on the named machine
    pub fn get_default_params(
        &self,
        registry: &MachineRegistry,
        machine: &str,
        action: &str,
    ) -> Result<Map<String, Value>> {
        registry.default_params(machine, action)
    }

    fn record_outcome(&self, id: u64, outcome: &Result<Value>) {
        let result = self.mutate(|jobs| {
            if let Some(job) = jobs.get_mut(&id) {
                match outcome {
                    Ok(_) => {
                        job.set_status(JobStatus::Done);
                        job.error = None;
                    }
                    Err(e) => {
                        job.set_status(JobStatus::Error);
                        job.error = Some(e.to_string());
                    }
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!("Could not persist status of job {}: {}", id, e);
        }
    }

    fn mark_running(&self, id: u64) -> Result<Job> {
        self.mutate(|jobs| {
            Ok(jobs.get_mut(&id).map(|job| {
                job.set_status(JobStatus::Running);
                job.error = None;
                job.clone()
            }))
        })?
        .ok_or_else(|| JobError::UnknownJob { id }.into())
    }

    async fn execute(&self, id: u64, registry: &MachineRegistry) -> Result<Value> {
        let job = self.mark_running(id)?;
        tracing::info!("Running job {}: {}.{}", id, job.machine, job.action);
        let outcome = registry
            .execute(&job.machine, &job.action, &job.params)
            .await;
        match &outcome {
            Ok(_) => tracing::info!("Job {} done", id),
            Err(e) => tracing::error!("Job {} failed: {}", id, e),
        }
        self.record_outcome(id, &outcome);
        outcome
    }

    /// Run one job on a background task
    ///
    /// Unknown job ids fail immediately; every other failure is recorded on
    /// the job and returned through the handle.
    pub fn run_job(
        self: &Arc<Self>,
        id: u64,
        registry: Arc<MachineRegistry>,
    ) -> Result<JoinHandle<Result<Value>>> {
        self.get_job(id)?;
        let manager = Arc::clone(self);
        Ok(tokio::spawn(async move {
            manager.execute(id, &registry).await
        }))
    }

    /// Run several jobs in order on one background task
    ///
    /// Stops at the first failure and returns its error.
    pub fn run_jobs(
        self: &Arc<Self>,
        ids: Vec<u64>,
        registry: Arc<MachineRegistry>,
    ) -> JoinHandle<Result<Vec<Value>>> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                results.push(manager.execute(id, &registry).await?);
            }
            Ok(results)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let manager = JobsManager::new();
        assert_eq!(manager.add_job().unwrap(), 0);
        assert_eq!(manager.add_job().unwrap(), 1);
        assert!(manager.delete_job(0).unwrap());
        assert!(!manager.delete_job(0).unwrap());
        assert_eq!(manager.add_job().unwrap(), 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_update_upserts_and_advances_counter() {
        let manager = JobsManager::new();
        let job = Job::new(10, "gripper", "open", Map::new()).with_description("release part");
        assert_eq!(manager.update_job(job).unwrap(), 10);
        assert_eq!(manager.get_job(10).unwrap().description, "release part");
        assert_eq!(manager.add_job().unwrap(), 11);

        let mut job = manager.get_job(10).unwrap();
        job.action = "close".to_string();
        manager.update_job(job).unwrap();
        assert_eq!(manager.get_job(10).unwrap().action, "close");
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_failed_write_leaves_table_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let parent = dir.path().join("data");
        let manager = JobsManager::load(parent.join("jobs.json"));

        assert!(manager.add_job().is_err());
        assert!(manager
            .update_job(Job::new(3, "gripper", "open", Map::new()))
            .is_err());
        assert!(manager.is_empty());

        std::fs::create_dir(&parent).unwrap();
        assert_eq!(manager.add_job().unwrap(), 0);
        assert_eq!(JobsManager::load(parent.join("jobs.json")).len(), 1);
    }

    #[test]
    fn test_largest_id_is_refused() {
        let manager = JobsManager::new();
        let err = manager
            .update_job(Job::new(u64::MAX, "gripper", "open", Map::new()).with_description("user job"))
            .unwrap_err();
        assert!(matches!(
            err,
            cellkit_core::Error::Job(JobError::IdOutOfRange { id: u64::MAX })
        ));
        assert!(manager.is_empty());

        manager
            .update_job(Job::new(u64::MAX - 1, "gripper", "open", Map::new()).with_description("last"))
            .unwrap();
        assert!(manager.add_job().unwrap_err().is_job_error());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get_job(u64::MAX - 1).unwrap().description, "last");
    }

    #[test]
    fn test_add_skips_ids_in_use() {
        let manager = JobsManager::new();
        manager.next_id.store(4, Ordering::SeqCst);
        manager
            .update_job(Job::new(4, "gripper", "open", Map::new()))
            .unwrap();
        manager.next_id.store(4, Ordering::SeqCst);
        assert_eq!(manager.add_job().unwrap(), 5);
        assert_eq!(manager.get_job(4).unwrap().action, "open");
    }

    #[test]
    fn test_unknown_job() {
        let manager = JobsManager::new();
        let err = manager.get_job(4).unwrap_err();
        assert!(matches!(
            err,
            cellkit_core::Error::Job(JobError::UnknownJob { id: 4 })
        ));
    }

    #[tokio::test]
    async fn test_run_records_failure() {
        let manager = Arc::new(JobsManager::new());
        let registry = Arc::new(MachineRegistry::default());
        let id = manager.add_job().unwrap();

        let outcome = manager.run_job(id, registry.clone()).unwrap().await.unwrap();
        assert!(outcome.unwrap_err().is_job_error());

        let job = manager.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.unwrap().contains("gantry"));

        assert!(manager.run_job(99, registry).is_err());
    }
}
