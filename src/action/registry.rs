//! アクションレジストリ
//!
//! 名前から [`Action`] を引く共有テーブルです。`Clone` は同じテーブルを共有するため、
//! エンジンの生成後にホストがアクションを追加・差し替えできます。

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use super::builtin;
use super::traits::Action;
use crate::error::{ActionError, ConfigError};

/// 名前付きアクションのレジストリ
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<DashMap<String, Arc<dyn Action>>>,
}

impl ActionRegistry {
    /// 空のレジストリ
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込みアクション（`log` / `wait` / `echo`）を登録済みのレジストリ
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.insert("log", Arc::new(builtin::log));
        registry.insert("wait", Arc::new(builtin::wait));
        registry.insert("echo", Arc::new(builtin::echo));
        registry
    }

    /// クロージャまたは `async fn` をアクションとして登録する
    ///
    /// 同名のアクションがある場合は上書きします。名前が空の場合はエラーになります。
    pub fn register<F, Fut>(&self, name: &str, action: F) -> Result<(), ConfigError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        self.register_action(name, Arc::new(action))
    }

    /// トレイトオブジェクトとしてアクションを登録する
    pub fn register_action(&self, name: &str, action: Arc<dyn Action>) -> Result<(), ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::Validation("アクション名が空です".to_string()));
        }
        self.insert(name, action);
        Ok(())
    }

    fn insert(&self, name: &str, action: Arc<dyn Action>) {
        if self.actions.insert(name.to_string(), action).is_some() {
            tracing::debug!(action = name, "アクションを上書きしました");
        } else {
            tracing::debug!(action = name, "アクションを登録しました");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// 登録済みのアクション名（ソート済み）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
