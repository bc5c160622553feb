//! ワークフロー実行結果の型定義
//!
//! # 主要な型
//!
//! - [`WorkflowRun`][]: 1回のラン全体の記録（ステータス、各ステップの結果、名前付き出力）
//! - [`StepResult`][]: 個別ステップの実行結果（入力、出力、エラー、所要時間）
//! - [`RunStatus`][] / [`StepStatus`][] / [`StepPhase`][]
//!
//! # 使用例
//!
//! ```rust,no_run
//! use flowdesk::engine::result::WorkflowRun;
//!
//! fn handle_run(run: WorkflowRun) {
//!     if run.is_success() {
//!         println!("ラン成功: {} ({})", run.workflow_name, run.execution_id);
//!         println!("完了ステップ数: {}/{}", run.completed_steps(), run.steps.len());
//!     } else if let Some(error) = &run.error {
//!         println!("ステップ '{}' で失敗: {}", error.step, error.message);
//!     }
//!
//!     if let Ok(json) = run.to_json() {
//!         println!("{}", json);
//!     }
//! }
//! ```

use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StepError;

/// ワークフローの実行記録
///
/// `execute` から返された後は変更されません。
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    /// 実行 ID
    pub execution_id: String,

    /// ワークフロー名
    pub workflow_name: String,

    /// 実行ステータス
    pub status: RunStatus,

    /// 各ステップの実行結果（実行順）
    pub steps: Vec<StepResult>,

    /// 終了時点のコンテキストのうち名前付き出力
    pub output: Map<String, Value>,

    /// 最初の失敗（失敗時のみ）
    pub error: Option<RunError>,

    /// 実行開始時刻
    pub started_at: SystemTime,

    /// 実行終了時刻
    pub completed_at: SystemTime,

    /// 総実行時間
    pub duration: Duration,
}

impl WorkflowRun {
    /// 結果をJSON形式でシリアライズ
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    /// [`StepStatus::Completed`] のステップ数
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count()
    }

    /// 名前でステップ結果を取得（最初に記録されたもの）
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|step| step.step_name == name)
    }

    /// 指定フェーズのステップ結果
    pub fn steps_in(&self, phase: StepPhase) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(move |step| step.phase == phase)
    }
}

/// ランの失敗情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    /// 失敗したステップ名
    pub step: String,
    /// エラーメッセージ
    pub message: String,
}

/// ステップ実行結果
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// ステップ名
    pub step_name: String,

    /// どのステップリストで実行されたか
    pub phase: StepPhase,

    /// 実行ステータス
    pub status: StepStatus,

    /// 解決済みの入力
    pub input: Option<Value>,

    /// 出力（完了時のみ）
    pub output: Option<Value>,

    /// エラーメッセージ（failed / timeout のみ）
    pub error: Option<String>,

    pub started_at: SystemTime,

    pub completed_at: SystemTime,

    /// 実行時間
    pub duration: Duration,
}

impl StepResult {
    /// 条件が偽でスキップされたステップ
    pub(crate) fn skipped(step_name: &str, phase: StepPhase) -> Self {
        let now = SystemTime::now();
        Self {
            step_name: step_name.to_string(),
            phase,
            status: StepStatus::Skipped,
            input: None,
            output: None,
            error: None,
            started_at: now,
            completed_at: now,
            duration: Duration::ZERO,
        }
    }

    pub(crate) fn completed(
        step_name: &str,
        phase: StepPhase,
        input: Option<Value>,
        output: Value,
        started_at: SystemTime,
    ) -> Self {
        let (completed_at, duration) = finish(started_at);
        Self {
            step_name: step_name.to_string(),
            phase,
            status: StepStatus::Completed,
            input,
            output: Some(output),
            error: None,
            started_at,
            completed_at,
            duration,
        }
    }

    /// 失敗したステップ（タイムアウト起因なら [`StepStatus::Timeout`]）
    pub(crate) fn failed(
        step_name: &str,
        phase: StepPhase,
        input: Option<Value>,
        error: &StepError,
        started_at: SystemTime,
    ) -> Self {
        let (completed_at, duration) = finish(started_at);
        let status = if error.is_timeout() {
            StepStatus::Timeout
        } else {
            StepStatus::Failed
        };
        Self {
            step_name: step_name.to_string(),
            phase,
            status,
            input,
            output: None,
            error: Some(error.to_string()),
            started_at,
            completed_at,
            duration,
        }
    }
}

fn finish(started_at: SystemTime) -> (SystemTime, Duration) {
    let completed_at = SystemTime::now();
    let duration = completed_at
        .duration_since(started_at)
        .unwrap_or(Duration::from_secs(0));
    (completed_at, duration)
}

/// ラン全体のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// すべてのステップが完了またはスキップ
    Completed,
    /// いずれかのステップが失敗またはタイムアウト
    Failed,
}

/// ステップのステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    /// 条件が偽
    Skipped,
    Failed,
    /// フォールバックなしでタイムアウト
    Timeout,
}

/// ステップが属するリスト
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    /// `steps`
    Main,
    /// `on_error`
    OnError,
    /// `on_complete`
    OnComplete,
}
