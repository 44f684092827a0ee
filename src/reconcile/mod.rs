//! Cache reconciliation around a step runner
//!
//! A run moves through three phases, each finishing before the next starts:
//!
//! 1. **Pre-check**: restore `cache_dir/<step>` for every enumerated step and
//!    record hits in a [`HitTable`].
//! 2. **Execute**: invoke the runner once; it skips restored steps and writes
//!    the missing ones.
//! 3. **Post-save**: list the cache root again, save every directory that was
//!    not a hit, and forward each directory's path hints.
//!
//! A failure in enumeration or execution aborts the run before any save.
//! Restore and save failures are logged and never abort.

mod paths;
mod report;

pub use paths::{propagate, PATH_MANIFEST};
pub use report::{RunReport, StepOutcome, StepReport};

use crate::cache::{CacheBackend, CacheKey, StepName};
use crate::error::{StepCacheError, StepCacheResult};
use crate::host::HostEnvironment;
use crate::runner::StepRunner;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default number of concurrent restore/save calls
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Inputs of a single run
#[derive(Debug, Clone)]
pub struct RunInputs {
    /// Runner whose steps are cached
    pub runner_name: String,
    /// Token appended to every cache key
    pub version_suffix: String,
    /// Root directory holding one sub-directory per step
    pub cache_dir: PathBuf,
}

impl RunInputs {
    fn key_for(&self, name: &str) -> CacheKey {
        CacheKey::for_step(name, &self.version_suffix)
    }
}

/// Hit/miss record produced by the pre-check phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitTable {
    entries: HashMap<String, Option<CacheKey>>,
}

impl HitTable {
    fn record(&mut self, name: &str, hit: Option<CacheKey>) {
        self.entries.insert(name.to_string(), hit);
    }

    /// Whether the step's directory was restored from the cache
    pub fn is_hit(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(Some(_)))
    }

    /// Whether the step was checked at all
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of checked steps
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the steps that were hits, sorted
    pub fn hits(&self) -> Vec<&str> {
        let mut hits: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, hit)| hit.is_some())
            .map(|(name, _)| name.as_str())
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Drives the pre-check / execute / post-save protocol
pub struct Reconciler {
    backend: Arc<dyn CacheBackend>,
    runner: Arc<dyn StepRunner>,
    host: Arc<dyn HostEnvironment>,
    concurrency: usize,
}

impl Reconciler {
    /// Create a reconciler with the default concurrency
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        runner: Arc<dyn StepRunner>,
        host: Arc<dyn HostEnvironment>,
    ) -> Self {
        Self {
            backend,
            runner,
            host,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Bound the number of concurrent backend calls (at least one)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run all three phases
    pub async fn run(&self, inputs: &RunInputs) -> StepCacheResult<RunReport> {
        let started_at = Utc::now();

        fs::create_dir_all(&inputs.cache_dir).await.map_err(|e| {
            StepCacheError::io(format!("creating {}", inputs.cache_dir.display()), e)
        })?;

        let steps = self.runner.list_steps(&inputs.runner_name).await?;
        info!(
            "Runner {} uses {} cacheable step(s)",
            inputs.runner_name,
            steps.len()
        );

        let hits = self.pre_check(&steps, inputs).await?;

        info!("Executing runner {} via {}", inputs.runner_name, self.runner.describe());
        self.runner
            .execute(&inputs.runner_name, &inputs.cache_dir)
            .await?;

        let steps_report = self.post_save(&hits, inputs).await?;

        Ok(RunReport {
            runner: inputs.runner_name.clone(),
            version_suffix: inputs.version_suffix.clone(),
            started_at,
            completed_at: Utc::now(),
            enumerated: steps.iter().map(|s| s.as_str().to_string()).collect(),
            steps: steps_report,
        })
    }

    /// Restore every step directory and record hits
    ///
    /// A restore error is logged and recorded as a miss. Duplicate names are
    /// checked once.
    pub async fn pre_check(
        &self,
        steps: &[StepName],
        inputs: &RunInputs,
    ) -> StepCacheResult<HitTable> {
        let mut seen = HashSet::new();
        let jobs: Vec<(StepName, PathBuf, CacheKey)> = steps
            .iter()
            .filter(|step| seen.insert(step.as_str()))
            .map(|step| {
                (
                    step.clone(),
                    step.dir_in(&inputs.cache_dir),
                    inputs.key_for(step.as_str()),
                )
            })
            .collect();

        let backend = Arc::clone(&self.backend);
        let results = bounded(self.concurrency, jobs, move |(step, path, key)| {
            let backend = Arc::clone(&backend);
            async move {
                let result = backend.restore(&[path], &key).await;
                (step, key, result)
            }
        })
        .await?;

        let mut table = HitTable::default();
        for (step, key, result) in results {
            let hit = match result {
                Ok(Some(matched)) => {
                    info!("Cache for the step with key {} is found.", key);
                    Some(matched)
                }
                Ok(None) => {
                    info!("Cache for the step with key {} is not found.", key);
                    None
                }
                Err(e) => {
                    warn!("Can not restore cache for key {}, treating as miss: {}", key, e);
                    None
                }
            };
            table.record(step.as_str(), hit);
        }

        debug!("Pre-check complete: {} of {} hit", table.hits().len(), table.len());
        Ok(table)
    }

    /// Save new step directories and forward their path hints
    ///
    /// Works from a fresh listing of the cache root, so directories created
    /// by the runner for steps outside the enumeration are saved too.
    pub async fn post_save(
        &self,
        hits: &HitTable,
        inputs: &RunInputs,
    ) -> StepCacheResult<Vec<StepReport>> {
        let dirs = list_step_dirs(&inputs.cache_dir).await?;

        let mut reports = Vec::with_capacity(dirs.len());
        let mut pending = Vec::new();
        for (index, name) in dirs.iter().enumerate() {
            let key = inputs.key_for(name);
            if hits.is_hit(name) {
                info!("Cache for the step with key {} has been hit. Skip saving.", key);
                reports.push(StepReport {
                    name: name.clone(),
                    key,
                    outcome: StepOutcome::Hit,
                    reason: None,
                    paths: Vec::new(),
                });
            } else {
                if !hits.contains(name) {
                    debug!("Directory {} was not enumerated, saving it anyway", name);
                }
                info!("Save cache for the step with key {}.", key);
                reports.push(StepReport {
                    name: name.clone(),
                    key: key.clone(),
                    outcome: StepOutcome::Saved,
                    reason: None,
                    paths: Vec::new(),
                });
                pending.push((index, inputs.cache_dir.join(name), key));
            }
        }

        let backend = Arc::clone(&self.backend);
        let results = bounded(self.concurrency, pending, move |(index, path, key)| {
            let backend = Arc::clone(&backend);
            async move {
                let result = backend.save(&[path], &key).await;
                (index, key, result)
            }
        })
        .await?;

        for (index, key, result) in results {
            if let Err(e) = result {
                warn!(
                    "Can not save step cache by key {}. It seems that it has been saved somewhere else. Original message: {}",
                    key, e
                );
                reports[index].outcome = StepOutcome::SaveFailed;
                reports[index].reason = Some(e.to_string());
            }
        }

        for report in &mut reports {
            let step_dir = inputs.cache_dir.join(&report.name);
            match propagate(&step_dir, self.host.as_ref()).await {
                Ok(paths) => report.paths = paths,
                Err(e) => warn!("Can not add paths for the step {}: {}", report.name, e),
            }
        }

        Ok(reports)
    }
}

/// Names of the directories directly under `cache_dir`, sorted
///
/// Anything that is not a directory (including symlinks) is skipped, as are
/// names that are not valid UTF-8.
async fn list_step_dirs(cache_dir: &Path) -> StepCacheResult<Vec<String>> {
    let mut names = Vec::new();

    let mut dir = match fs::read_dir(cache_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
        Err(e) => {
            return Err(StepCacheError::io(
                format!("listing {}", cache_dir.display()),
                e,
            ))
        }
    };

    while let Some(child) = dir
        .next_entry()
        .await
        .map_err(|e| StepCacheError::io(format!("listing {}", cache_dir.display()), e))?
    {
        let file_type = child
            .file_type()
            .await
            .map_err(|e| StepCacheError::io(format!("inspecting {}", child.path().display()), e))?;
        if !file_type.is_dir() {
            debug!("Skipping non-directory {}", child.path().display());
            continue;
        }

        match child.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => warn!("Skipping non UTF-8 directory {:?}, it will not be cached", name),
        }
    }

    names.sort();
    Ok(names)
}

/// Run `task` over `items` with at most `limit` in flight
///
/// Results come back in input order once every task has finished.
async fn bounded<I, T, F, Fut>(limit: usize, items: Vec<I>, task: F) -> StepCacheResult<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut join_set = JoinSet::new();
    let total = items.len();

    for (index, item) in items.into_iter().enumerate() {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| StepCacheError::Internal(format!("worker pool closed: {}", e)))?;
        let fut = task(item);
        join_set.spawn(async move {
            let output = fut.await;
            drop(permit);
            (index, output)
        });
    }

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        let (index, output) =
            joined.map_err(|e| StepCacheError::Internal(format!("cache task failed: {}", e)))?;
        slots[index] = Some(output);
    }

    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| StepCacheError::Internal("cache task lost".to_string())))
        .collect()
}
