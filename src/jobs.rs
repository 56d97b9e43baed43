use crate::{
    engine::Engine,
    input::validate_input,
    pipeline::{Pipeline, panic_message},
    report::JobState,
    util::now_rfc3339,
};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub error: Option<String>,
    pub created_at: String,
    pub finished_at: Option<String>,
}

impl ConversionJob {
    pub fn pending(input: &Path, output: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            status: JobStatus::Pending,
            progress_percent: 0,
            error: None,
            created_at: now_rfc3339(),
            finished_at: None,
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            status: self.status,
            progress_percent: self.progress_percent,
            output_reference: (self.status == JobStatus::Succeeded)
                .then(|| self.output.display().to_string()),
            error_message: self.error.clone(),
        }
    }
}

/// What a status poller sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub output_reference: Option<String>,
    pub error_message: Option<String>,
}

pub trait JobStore: Send + Sync {
    fn insert(&self, job: ConversionJob) -> Result<()>;
    /// Applies `f` to the entry. Returns false when the id is unknown or the
    /// entry is already terminal; terminal entries are never modified.
    fn update(&self, id: JobId, f: &mut dyn FnMut(&mut ConversionJob)) -> bool;
    fn get(&self, id: JobId) -> Option<ConversionJob>;
    fn list(&self) -> Vec<ConversionJob>;
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, ConversionJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: ConversionJob) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.id) {
            return Err(anyhow!("duplicate job id {}", job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    fn update(&self, id: JobId, f: &mut dyn FnMut(&mut ConversionJob)) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(&id) {
            Some(job) if !job.status.is_terminal() => {
                f(job);
                true
            }
            Some(_) => {
                debug!("ignoring update to terminal job {id}");
                false
            }
            None => false,
        }
    }

    fn get(&self, id: JobId) -> Option<ConversionJob> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn list(&self) -> Vec<ConversionJob> {
        let mut all: Vec<ConversionJob> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }
}

/// The only write handle for one job entry. Not `Clone`: it moves into the
/// job's worker and nowhere else.
pub struct JobWriter {
    id: JobId,
    store: Arc<dyn JobStore>,
}

impl JobWriter {
    pub fn new(id: JobId, store: Arc<dyn JobStore>) -> Self {
        Self { id, store }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn running(&self) {
        self.store
            .update(self.id, &mut |job| job.status = JobStatus::Running);
    }

    pub fn progress(&self, percent: u8) {
        self.store
            .update(self.id, &mut |job| job.progress_percent = percent.min(100));
    }

    pub fn succeed(&self) {
        self.store.update(self.id, &mut |job| {
            job.status = JobStatus::Succeeded;
            job.progress_percent = 100;
            job.error = None;
            job.finished_at = Some(now_rfc3339());
        });
    }

    pub fn fail(&self, reason: &str) {
        self.store.update(self.id, &mut |job| {
            job.status = JobStatus::Failed;
            job.progress_percent = 0;
            job.error = Some(reason.to_string());
            job.finished_at = Some(now_rfc3339());
        });
    }
}

/// Progress shown for each pipeline state.
pub fn progress_for(state: JobState) -> u8 {
    match state {
        JobState::Start => 0,
        JobState::Classified => 10,
        JobState::Extracted => 70,
        JobState::Augmented => 90,
        JobState::Validated => 95,
        JobState::Succeeded => 100,
        JobState::Failed => 0,
    }
}

/// Runs each submitted conversion on its own worker thread.
pub struct JobRunner<E: Engine> {
    pipeline: Arc<Pipeline<E>>,
    store: Arc<dyn JobStore>,
}

impl<E: Engine + 'static> JobRunner<E> {
    pub fn new(pipeline: Pipeline<E>) -> Self {
        Self::with_store(pipeline, Arc::new(MemoryJobStore::new()))
    }

    pub fn with_store(pipeline: Pipeline<E>, store: Arc<dyn JobStore>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn submit(&self, input: &Path, output: &Path) -> Result<JobId> {
        validate_input(self.pipeline.config(), input)?;

        let job = ConversionJob::pending(input, output);
        let id = job.id;
        self.store.insert(job)?;
        info!("job {id} queued: {} -> {}", input.display(), output.display());

        let writer = JobWriter::new(id, Arc::clone(&self.store));
        let pipeline = Arc::clone(&self.pipeline);
        let (input, output) = (input.to_path_buf(), output.to_path_buf());

        let spawned = std::thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || run_job(&pipeline, writer, &input, &output));

        if let Err(err) = spawned {
            let reason = format!("could not start worker: {err}");
            self.store.update(id, &mut |job| {
                job.status = JobStatus::Failed;
                job.error = Some(reason.clone());
            });
            return Err(err).with_context(|| format!("spawning worker for job {id}"));
        }
        Ok(id)
    }

    pub fn view(&self, id: JobId) -> Option<JobView> {
        self.store.get(id).map(|job| job.view())
    }

    pub fn active_count(&self) -> usize {
        self.store
            .list()
            .iter()
            .filter(|job| !job.status.is_terminal())
            .count()
    }

    /// Polls until every listed job is terminal. Unknown ids are skipped.
    pub fn wait(&self, ids: &[JobId], poll: Duration) -> Vec<JobView> {
        loop {
            let views: Vec<JobView> = ids.iter().filter_map(|id| self.view(*id)).collect();
            if views.iter().all(|v| v.status.is_terminal()) {
                return views;
            }
            std::thread::sleep(poll);
        }
    }
}

fn run_job<E: Engine>(pipeline: &Pipeline<E>, writer: JobWriter, input: &Path, output: &Path) {
    writer.running();
    let res = catch_unwind(AssertUnwindSafe(|| {
        pipeline.convert_observed(input, output, &|state| {
            if !state.is_terminal() {
                writer.progress(progress_for(state));
            }
        })
    }));

    match res {
        Ok(outcome) if outcome.succeeded() => {
            info!("job {} succeeded", writer.id());
            writer.succeed();
        }
        Ok(outcome) => {
            let reason = outcome
                .failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "conversion failed".to_string());
            writer.fail(&reason);
        }
        Err(panic) => {
            let reason = format!("worker panicked: {}", panic_message(&*panic));
            warn!("job {}: {reason}", writer.id());
            writer.fail(&reason);
        }
    }
}
