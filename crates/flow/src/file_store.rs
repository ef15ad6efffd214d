//! File-backed plan store: one pretty-printed JSON document per plan.
//!
//! Storage location: `<plan_dir>/<plan_id>.json`. Plans are read from disk
//! the first time they are asked for and cached; every mutation is written
//! back before it returns.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepwise_core::error::PlanError;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::plan::{Plan, StepStatus};
use crate::store::PlanStore;

pub struct FilePlanStore {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, Plan>>>,
}

impl FilePlanStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File plan store opened");
        Self {
            dir,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, plan_id: &str) -> Result<PathBuf, PlanError> {
        let safe = !plan_id.is_empty()
            && plan_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !safe {
            return Err(PlanError::Storage(format!(
                "plan id '{plan_id}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{plan_id}.json")))
    }

    async fn load(&self, plan_id: &str) -> Result<Option<Plan>, PlanError> {
        let path = self.path_for(plan_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PlanError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        let plan = serde_json::from_str::<Plan>(&content).map_err(|e| {
            PlanError::Storage(format!("Corrupted plan file {}: {e}", path.display()))
        })?;
        Ok(Some(plan))
    }

    async fn flush(&self, plan: &Plan) -> Result<(), PlanError> {
        let path = self.path_for(&plan.plan_id)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PlanError::Storage(format!("Failed to create plan directory: {e}"))
        })?;
        let content = serde_json::to_string_pretty(plan)
            .map_err(|e| PlanError::Storage(format!("Failed to serialize plan: {e}")))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| PlanError::Storage(format!("Failed to write {}: {e}", path.display())))
    }

    /// Cached copy, or the on-disk one (then cached).
    async fn lookup(&self, plan_id: &str) -> Result<Option<Plan>, PlanError> {
        if let Some(plan) = self.cache.read().await.get(plan_id) {
            return Ok(Some(plan.clone()));
        }
        let loaded = self.load(plan_id).await?;
        if let Some(plan) = &loaded {
            self.cache
                .write()
                .await
                .insert(plan_id.to_string(), plan.clone());
        }
        Ok(loaded)
    }
}

#[async_trait]
impl PlanStore for FilePlanStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn create(&self, plan: Plan) -> Result<Plan, PlanError> {
        if self.lookup(&plan.plan_id).await?.is_some() {
            return Err(PlanError::AlreadyExists(plan.plan_id));
        }
        self.flush(&plan).await?;
        self.cache
            .write()
            .await
            .insert(plan.plan_id.clone(), plan.clone());
        Ok(plan)
    }

    async fn get(&self, plan_id: &str) -> Result<Plan, PlanError> {
        self.lookup(plan_id)
            .await?
            .ok_or_else(|| PlanError::NotFound(plan_id.to_string()))
    }

    async fn mark_step(
        &self,
        plan_id: &str,
        index: usize,
        status: Option<StepStatus>,
        notes: Option<String>,
    ) -> Result<Plan, PlanError> {
        let mut plan = self.get(plan_id).await?;
        plan.mark_step(index, status, notes);
        self.flush(&plan).await?;
        self.cache
            .write()
            .await
            .insert(plan_id.to_string(), plan.clone());
        Ok(plan)
    }

    async fn list(&self) -> Result<Vec<Plan>, PlanError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PlanError::Storage(format!("Failed to list plans: {e}"))),
        };

        let mut plans = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PlanError::Storage(format!("Failed to list plans: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(plan_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.lookup(plan_id).await {
                Ok(Some(plan)) => plans.push(plan),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable plan file"),
            }
        }
        plans.sort_by(|a, b| a.plan_id.cmp(&b.plan_id));
        Ok(plans)
    }
}
