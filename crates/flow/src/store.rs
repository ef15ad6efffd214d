//! Plan storage.
//!
//! Plans are keyed by `plan_id` and only accumulate. Each flow works on a
//! single plan id; the store does not coordinate two writers of one id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use stepwise_core::error::PlanError;
use tokio::sync::RwLock;

use crate::plan::{Plan, Step, StepStatus};

/// Named operations every plan backend supports.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Store a new plan. Fails if the id is taken.
    async fn create(&self, plan: Plan) -> Result<Plan, PlanError>;

    async fn get(&self, plan_id: &str) -> Result<Plan, PlanError>;

    async fn get_step(&self, plan_id: &str, index: usize) -> Result<Step, PlanError> {
        let plan = self.get(plan_id).await?;
        plan.steps
            .get(index)
            .cloned()
            .ok_or_else(|| PlanError::StepOutOfRange {
                plan_id: plan_id.to_string(),
                index,
                len: plan.steps.len(),
            })
    }

    /// Set the status and/or notes of one step and return the updated plan.
    async fn mark_step(
        &self,
        plan_id: &str,
        index: usize,
        status: Option<StepStatus>,
        notes: Option<String>,
    ) -> Result<Plan, PlanError>;

    /// All plans, ordered by id.
    async fn list(&self) -> Result<Vec<Plan>, PlanError>;

    async fn contains(&self, plan_id: &str) -> Result<bool, PlanError> {
        match self.get(plan_id).await {
            Ok(_) => Ok(true),
            Err(PlanError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Process-local plan store.
#[derive(Clone, Default)]
pub struct InMemoryPlanStore {
    plans: Arc<RwLock<HashMap<String, Plan>>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, plan: Plan) -> Result<Plan, PlanError> {
        let mut plans = self.plans.write().await;
        if plans.contains_key(&plan.plan_id) {
            return Err(PlanError::AlreadyExists(plan.plan_id));
        }
        plans.insert(plan.plan_id.clone(), plan.clone());
        Ok(plan)
    }

    async fn get(&self, plan_id: &str) -> Result<Plan, PlanError> {
        self.plans
            .read()
            .await
            .get(plan_id)
            .cloned()
            .ok_or_else(|| PlanError::NotFound(plan_id.to_string()))
    }

    async fn mark_step(
        &self,
        plan_id: &str,
        index: usize,
        status: Option<StepStatus>,
        notes: Option<String>,
    ) -> Result<Plan, PlanError> {
        let mut plans = self.plans.write().await;
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| PlanError::NotFound(plan_id.to_string()))?;
        plan.mark_step(index, status, notes);
        Ok(plan.clone())
    }

    async fn list(&self) -> Result<Vec<Plan>, PlanError> {
        let mut plans: Vec<Plan> = self.plans.read().await.values().cloned().collect();
        plans.sort_by(|a, b| a.plan_id.cmp(&b.plan_id));
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_mark_get_round_trip() {
        let store = InMemoryPlanStore::new();
        store
            .create(Plan::new(
                "p1",
                "Default",
                "req",
                ["Analyze request", "Execute task", "Verify results"],
            ))
            .await
            .unwrap();

        store
            .mark_step("p1", 0, Some(StepStatus::Completed), None)
            .await
            .unwrap();
        let plan = store.get("p1").await.unwrap();

        let statuses: Vec<StepStatus> = plan.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Completed, StepStatus::NotStarted, StepStatus::NotStarted]
        );
        assert_eq!(plan.steps[1].text, "Execute task");
        assert_eq!(store.get_step("p1", 2).await.unwrap().text, "Verify results");
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = InMemoryPlanStore::new();
        store.create(Plan::fallback("p", "a")).await.unwrap();
        let err = store.create(Plan::fallback("p", "b")).await.unwrap_err();
        assert_eq!(err, PlanError::AlreadyExists("p".into()));
    }

    #[tokio::test]
    async fn missing_plan_and_step() {
        let store = InMemoryPlanStore::new();
        assert!(!store.contains("nope").await.unwrap());
        assert!(matches!(store.get("nope").await, Err(PlanError::NotFound(_))));

        store.create(Plan::fallback("p", "a")).await.unwrap();
        assert!(store.contains("p").await.unwrap());
        assert!(matches!(
            store.get_step("p", 9).await,
            Err(PlanError::StepOutOfRange { index: 9, len: 3, .. })
        ));
        let padded = store.mark_step("p", 3, None, Some("x".into())).await.unwrap();
        assert_eq!(padded.len(), 4);
        assert_eq!(padded.steps[3].status, StepStatus::NotStarted);
        assert_eq!(padded.steps[3].notes, "x");
        assert!(store.mark_step("nope", 0, None, None).await.is_err());
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let store = InMemoryPlanStore::new();
        store.create(Plan::fallback("b", "x")).await.unwrap();
        store.create(Plan::fallback("a", "y")).await.unwrap();
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|p| p.plan_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
