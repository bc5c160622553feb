//! human_in_loop ステップのエグゼキューター
//!
//! # 動作
//!
//! 1. (`execution_id`, ステップ名) をキーに保留中リクエストを登録する
//! 2. [`EngineEvent::HumanReviewRequested`] を発行し、`action` があれば通知アクションを呼ぶ
//! 3. oneshot チャネルで応答を待つ（`timeout` があればタイマーと競合させる）
//!
//! 応答は [`HumanInLoopExecutor::submit_response`] で渡します。
//!
//! | 応答 | 出力 |
//! |------|------|
//! | `approve` | `{"approved": true, "data": <input>}` |
//! | `modify` | `{"approved": true, "modified": true, "data": <data>}` |
//! | `reject` | 失敗（`human rejected: <reason>`） |
//! | `timeout` | `fallback = "auto_approve"` なら `{"approved": true, "autoApproved": true, "data": <input>}`、それ以外はタイムアウト |
//!
//! 保留中リクエストは応答・タイムアウト・待機中のランの破棄のいずれかで削除されます。

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{broadcast, oneshot};

use super::traits::{StepExecutor, StepInvocation, StepOutput};
use crate::action::ActionRegistry;
use crate::config::{Fallback, StepDefinition, StepKind};
use crate::engine::event::EngineEvent;
use crate::error::StepError;

const DEFAULT_REJECT_REASON: &str = "no reason provided";

/// 保留中リクエストの相関キー
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CorrelationKey {
    pub execution_id: String,
    pub step_name: String,
}

impl CorrelationKey {
    pub fn new(execution_id: impl Into<String>, step_name: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            step_name: step_name.into(),
        }
    }
}

/// 人の判断を待っているリクエスト
#[derive(Debug, Clone, Serialize)]
pub struct PendingHumanRequest {
    pub execution_id: String,
    pub workflow_name: String,
    pub step_name: String,
    /// 解決済みの入力（レビュー対象）
    pub input: Value,
    pub fallback: Option<Value>,
    pub timeout: Option<Duration>,
    pub requested_at: SystemTime,
}

impl PendingHumanRequest {
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey::new(&self.execution_id, &self.step_name)
    }

    /// 通知アクションに渡す値
    fn to_notification(&self) -> Value {
        json!({
            "execution_id": self.execution_id,
            "workflow_name": self.workflow_name,
            "step_name": self.step_name,
            "input": self.input,
            "fallback": self.fallback,
            "timeout_ms": self.timeout.map(|t| t.as_millis() as u64),
        })
    }
}

/// 人による判断
///
/// JSON では `{"action": "approve"}` / `{"action": "modify", "data": ...}` /
/// `{"action": "reject", "reason": "..."}` / `{"action": "timeout"}` と表現します。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HumanDecision {
    Approve,
    Modify {
        data: Value,
    },
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
    Timeout,
}

struct PendingEntry {
    request: PendingHumanRequest,
    responder: oneshot::Sender<HumanDecision>,
}

/// 待機を抜けたとき（ドロップを含む）に保留中リクエストを削除する
struct PendingGuard<'a> {
    pending: &'a DashMap<CorrelationKey, PendingEntry>,
    key: &'a CorrelationKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.key);
    }
}

/// 人の判断を待つエグゼキューター
///
/// 保留中リクエストのテーブルを所有し、エンジンから応答を受け付けます。
pub struct HumanInLoopExecutor {
    pending: DashMap<CorrelationKey, PendingEntry>,
    actions: ActionRegistry,
    events: broadcast::Sender<EngineEvent>,
}

impl HumanInLoopExecutor {
    pub fn new(actions: ActionRegistry, events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            pending: DashMap::new(),
            actions,
            events,
        }
    }

    /// 保留中リクエストに応答する
    ///
    /// 該当するリクエストがない場合は警告ログを出力して `false` を返します。
    pub fn submit_response(&self, execution_id: &str, step_name: &str, decision: HumanDecision) -> bool {
        let key = CorrelationKey::new(execution_id, step_name);

        let Some((_, entry)) = self.pending.remove(&key) else {
            tracing::warn!(execution_id, step = step_name, "該当する保留中リクエストがありません");
            return false;
        };

        tracing::info!(execution_id, step = step_name, decision = ?decision, "人による判断を受け付けました");
        if entry.responder.send(decision).is_err() {
            tracing::warn!(execution_id, step = step_name, "待機中のステップが既に終了しています");
            return false;
        }
        true
    }

    /// 保留中リクエストの一覧（要求日時順）
    pub fn pending_requests(&self) -> Vec<PendingHumanRequest> {
        let mut requests: Vec<PendingHumanRequest> = self
            .pending
            .iter()
            .map(|entry| entry.value().request.clone())
            .collect();
        requests.sort_by_key(|r| r.requested_at);
        requests
    }

    pub fn is_pending(&self, execution_id: &str, step_name: &str) -> bool {
        self.pending.contains_key(&CorrelationKey::new(execution_id, step_name))
    }

    async fn wait_for_decision(
        &self,
        step: &StepDefinition,
        key: &CorrelationKey,
        mut rx: oneshot::Receiver<HumanDecision>,
    ) -> Result<HumanDecision, StepError> {
        let received = match step.timeout() {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(received) => received,
                // 応答側が先にエントリを取り出していれば、その応答を待つ
                Err(_) if self.pending.remove(key).is_some() => Ok(HumanDecision::Timeout),
                Err(_) => rx.await,
            },
        };
        received.map_err(|_| StepError::HumanAborted(step.name().to_string()))
    }
}

#[async_trait]
impl StepExecutor for HumanInLoopExecutor {
    fn supports(&self, step: &StepDefinition) -> bool {
        step.kind() == StepKind::HumanInLoop
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        invocation: &StepInvocation<'_>,
    ) -> Result<StepOutput, StepError> {
        let request = PendingHumanRequest {
            execution_id: invocation.execution_id.to_string(),
            workflow_name: invocation.workflow_name.to_string(),
            step_name: step.name().to_string(),
            input: invocation.input.clone(),
            fallback: step.fallback().map(Fallback::to_value),
            timeout: step.timeout(),
            requested_at: SystemTime::now(),
        };
        let key = request.key();
        let (tx, rx) = oneshot::channel();

        let replaced = self.pending.insert(
            key.clone(),
            PendingEntry {
                request: request.clone(),
                responder: tx,
            },
        );
        if replaced.is_some() {
            tracing::warn!(execution_id = %key.execution_id, step = step.name(), "同じキーの保留中リクエストを置き換えました");
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            key: &key,
        };

        tracing::info!(
            execution_id = %key.execution_id,
            workflow = invocation.workflow_name,
            step = step.name(),
            "人による判断を待っています"
        );
        // 受信者がいなければ破棄される
        let _ = self.events.send(EngineEvent::HumanReviewRequested(request.clone()));

        if let Some(name) = step.action() {
            let notifier = self
                .actions
                .get(name)
                .ok_or_else(|| StepError::UnknownAction(name.to_string()))?;
            notifier
                .call(request.to_notification())
                .await
                .map_err(|source| StepError::ActionFailed {
                    action: name.to_string(),
                    source,
                })?;
        }

        let decision = self.wait_for_decision(step, &key, rx).await?;
        let input = request.input;

        let value = match decision {
            HumanDecision::Approve => json!({ "approved": true, "data": input }),
            HumanDecision::Modify { data } => json!({ "approved": true, "modified": true, "data": data }),
            HumanDecision::Reject { reason } => {
                return Err(StepError::HumanRejected {
                    step_name: step.name().to_string(),
                    reason: reason.unwrap_or_else(|| DEFAULT_REJECT_REASON.to_string()),
                });
            }
            HumanDecision::Timeout => match step.fallback() {
                Some(Fallback::AutoApprove) => {
                    tracing::warn!(step = step.name(), "タイムアウトしたため自動承認します");
                    json!({ "approved": true, "autoApproved": true, "data": input })
                }
                _ => return Err(StepError::HumanTimedOut(step.name().to_string())),
            },
        };

        Ok(StepOutput::new(value))
    }
}
