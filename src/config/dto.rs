//! TOML デシリアライズ用の DTO (Data Transfer Object)
//!
//! # 責務
//!
//! このモジュールは、TOML ファイルからのデータ読み込み専用の構造体を提供します。
//! DTO はバリデーション前の「生データ」を表現し、ドメインモデルとは分離されています。
//!
//! ## 変換フロー
//!
//! ```text
//! TOML ファイル
//!   ↓ (デシリアライズ)
//! WorkflowDto
//!   ↓ (TryFrom でバリデーション)
//! WorkflowDefinition (ドメインモデル)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::step::StepKind;

/// ワークフロー DTO
///
/// TOML の `[workflow]` セクションと `[[steps]]` / `[[on_complete]]` / `[[on_error]]`
/// 配列をデシリアライズ/シリアライズします。
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct WorkflowDto {
    /// ワークフローのメタデータ
    pub(super) workflow: WorkflowMetadataDto,
    /// ステップの配列
    #[serde(default)]
    pub(super) steps: Vec<WorkflowStepDto>,
    /// 完了後に実行するステップ
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(super) on_complete: Vec<WorkflowStepDto>,
    /// メインステップ失敗時に実行するステップ
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(super) on_error: Vec<WorkflowStepDto>,
}

/// ワークフローメタデータ DTO
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct WorkflowMetadataDto {
    pub(super) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) version: Option<String>,
    #[serde(default)]
    pub(super) trigger: TriggerDto,
}

/// トリガー DTO
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct TriggerDto {
    #[serde(rename = "type")]
    pub(super) kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) schedule: Option<String>,
}

impl Default for TriggerDto {
    fn default() -> Self {
        Self {
            kind: "manual".to_string(),
            channel: None,
            event: None,
            schedule: None,
        }
    }
}

/// ワークフローステップ DTO
///
/// `timeout` はミリ秒。`steps` は parallel ステップのサブステップで、
/// TOML 上はテーブル配列になるため最後に置く。
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct WorkflowStepDto {
    pub(super) name: String,
    #[serde(rename = "type", default)]
    pub(super) kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) timeout: Option<u64>,
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub(super) loop_over: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) fallback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) input: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(super) steps: Vec<WorkflowStepDto>,
}
