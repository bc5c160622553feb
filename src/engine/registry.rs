//! ワークフロー定義のレジストリ
//!
//! ロード済みの [`WorkflowDefinition`] を名前で保持します。定義は `Arc` で共有され、
//! 実行中のランは差し替え（ホットリロード）の影響を受けません。

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::config::WorkflowDefinition;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: Arc<DashMap<String, Arc<WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 定義を登録する（同名の定義がある場合はエラー）
    pub fn insert(&self, workflow: WorkflowDefinition) -> Result<Arc<WorkflowDefinition>, ConfigError> {
        match self.workflows.entry(workflow.name().to_string()) {
            Entry::Occupied(entry) => Err(ConfigError::DuplicateWorkflow(entry.key().clone())),
            Entry::Vacant(entry) => {
                let workflow = Arc::new(workflow);
                entry.insert(Arc::clone(&workflow));
                Ok(workflow)
            }
        }
    }

    /// 定義を登録または差し替え、以前の定義を返す
    pub fn upsert(&self, workflow: WorkflowDefinition) -> Option<Arc<WorkflowDefinition>> {
        self.workflows
            .insert(workflow.name().to_string(), Arc::new(workflow))
    }

    pub fn get(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.remove(name).map(|(_, workflow)| workflow)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// 登録済みのワークフロー名（ソート済み）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
