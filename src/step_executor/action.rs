//! action ステップのエグゼキューター
//!
//! - 登録済みアクションを解決済みの入力で呼び出す
//! - `timeout`（未指定ならエンジン設定のデフォルト）を超えた場合は `fallback` を返す。
//!   `fallback` がなければタイムアウトとして失敗する
//! - `loop` がある場合は配列の要素ごとに `item` を束縛して呼び出し、結果を配列で返す

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::traits::{StepExecutor, StepInvocation, StepOutput};
use crate::action::{Action, ActionRegistry};
use crate::config::{Fallback, StepDefinition, StepKind};
use crate::engine::context::LOOP_VARIABLE;
use crate::engine::expression::{resolve, resolve_input};
use crate::error::StepError;

/// 登録済みアクションを呼び出すエグゼキューター
#[derive(Debug, Clone)]
pub struct ActionStepExecutor {
    actions: ActionRegistry,
    default_timeout: Option<Duration>,
}

impl ActionStepExecutor {
    pub fn new(actions: ActionRegistry) -> Self {
        Self {
            actions,
            default_timeout: None,
        }
    }

    /// `timeout` 未指定のステップに適用するタイムアウト
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    async fn invoke(
        &self,
        step: &StepDefinition,
        action_name: &str,
        action: &Arc<dyn Action>,
        input: Value,
    ) -> Result<Value, StepError> {
        let to_step_error = |source| StepError::ActionFailed {
            action: action_name.to_string(),
            source,
        };

        let Some(limit) = step.timeout().or(self.default_timeout) else {
            return action.call(input).await.map_err(to_step_error);
        };

        match tokio::time::timeout(limit, action.call(input)).await {
            Ok(result) => result.map_err(to_step_error),
            Err(_) => match step.fallback() {
                Some(Fallback::Value(value)) => {
                    tracing::warn!(
                        step = step.name(),
                        timeout_ms = limit.as_millis() as u64,
                        "タイムアウトしたためフォールバック値を使用します"
                    );
                    Ok(value.clone())
                }
                Some(Fallback::AutoApprove) => {
                    tracing::warn!(step = step.name(), "タイムアウトしたため自動承認します");
                    Ok(json!({ "approved": true, "autoApproved": true }))
                }
                None => Err(StepError::Timeout {
                    step_name: step.name().to_string(),
                    timeout: limit,
                }),
            },
        }
    }
}

#[async_trait]
impl StepExecutor for ActionStepExecutor {
    fn supports(&self, step: &StepDefinition) -> bool {
        step.kind() == StepKind::Action
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        invocation: &StepInvocation<'_>,
    ) -> Result<StepOutput, StepError> {
        let action_name = step
            .action()
            .ok_or_else(|| StepError::MissingAction(step.name().to_string()))?;
        let action = self
            .actions
            .get(action_name)
            .ok_or_else(|| StepError::UnknownAction(action_name.to_string()))?;

        let Some(expression) = step.loop_over() else {
            let value = self
                .invoke(step, action_name, &action, invocation.input.clone())
                .await?;
            return Ok(StepOutput::new(value));
        };

        let items = match resolve(expression, invocation.context) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(StepError::NotIterable {
                    step_name: step.name().to_string(),
                    expression: expression.to_string(),
                });
            }
        };

        tracing::debug!(step = step.name(), iterations = items.len(), "loop を実行します");

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let scoped = invocation.context.with_binding(LOOP_VARIABLE, item);
            let input = step
                .input()
                .map(|raw| resolve_input(raw, &scoped))
                .unwrap_or(Value::Null);
            results.push(self.invoke(step, action_name, &action, input).await?);
        }

        Ok(StepOutput::new(Value::Array(results)))
    }
}
