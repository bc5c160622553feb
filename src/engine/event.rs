//! エンジンイベント
//!
//! [`WorkflowEngine::subscribe`](super::WorkflowEngine::subscribe) で受信できます。
//! 受信者がいない場合、イベントは破棄されます。

use serde::Serialize;

use super::result::RunStatus;
use crate::step_executor::PendingHumanRequest;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// ランを開始した
    RunStarted {
        execution_id: String,
        workflow_name: String,
    },
    /// human_in_loop ステップが人の判断を待ち始めた
    HumanReviewRequested(PendingHumanRequest),
    /// ランが終了した
    RunFinished {
        execution_id: String,
        workflow_name: String,
        status: RunStatus,
    },
}

impl EngineEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            EngineEvent::RunStarted { execution_id, .. } | EngineEvent::RunFinished { execution_id, .. } => {
                execution_id
            }
            EngineEvent::HumanReviewRequested(request) => &request.execution_id,
        }
    }
}
