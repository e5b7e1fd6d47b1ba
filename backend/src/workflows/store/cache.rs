use async_trait::async_trait;
use crm_automation_shared::{TriggerType, WorkflowRule, WorkflowRuleInput};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{RuleStore, StoreResult};

/// Caches the per-trigger rule lists the engine reads on every firing.
/// Any write through this store drops every cached list.
pub struct CachedRuleStore {
    inner: Arc<dyn RuleStore>,
    state: RwLock<CacheState>,
}

#[derive(Default)]
struct CacheState {
    /// Bumped on every invalidation; a fetch started under an older
    /// generation must not populate the cache.
    generation: u64,
    by_trigger: HashMap<TriggerType, Vec<WorkflowRule>>,
}

impl CachedRuleStore {
    pub fn new(inner: Arc<dyn RuleStore>) -> Self {
        Self {
            inner,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.generation += 1;
        if !state.by_trigger.is_empty() {
            debug!("Invalidating {} cached rule lists", state.by_trigger.len());
            state.by_trigger.clear();
        }
    }
}

#[async_trait]
impl RuleStore for CachedRuleStore {
    async fn create(&self, input: WorkflowRuleInput, created_by: Option<Uuid>) -> StoreResult<WorkflowRule> {
        let rule = self.inner.create(input, created_by).await?;
        self.invalidate().await;
        Ok(rule)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<WorkflowRule>> {
        self.inner.get(id).await
    }

    async fn update(&self, id: Uuid, input: WorkflowRuleInput) -> StoreResult<WorkflowRule> {
        let rule = self.inner.update(id, input).await?;
        self.invalidate().await;
        Ok(rule)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.inner.delete(id).await?;
        self.invalidate().await;
        Ok(())
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> StoreResult<WorkflowRule> {
        let rule = self.inner.set_enabled(id, enabled).await?;
        self.invalidate().await;
        Ok(rule)
    }

    async fn list(&self, enabled_only: bool) -> StoreResult<Vec<WorkflowRule>> {
        self.inner.list(enabled_only).await
    }

    async fn list_for_trigger(&self, trigger: TriggerType) -> StoreResult<Vec<WorkflowRule>> {
        let generation = {
            let state = self.state.read().await;
            if let Some(rules) = state.by_trigger.get(&trigger) {
                return Ok(rules.clone());
            }
            state.generation
        };

        let rules = self.inner.list_for_trigger(trigger).await?;

        let mut state = self.state.write().await;
        if state.generation == generation {
            state.by_trigger.insert(trigger, rules.clone());
        } else {
            debug!("Discarding rule list for {} fetched before an invalidation", trigger);
        }
        Ok(rules)
    }
}
