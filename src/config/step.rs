//! ワークフローステップの定義
//!
//! # 責務
//!
//! Workflow を構成する Step の定義体を提供するモジュール。
//! アプリケーションに対して、[`StepDefinition`] を提供する。
//!
//! ## TOML 表現
//!
//! ```toml
//! [[steps]]
//! name = "classify"
//! action = "classify_intent"
//! input = "$trigger.message"
//! output = "intent"
//! timeout = 3000
//! fallback = { intent = "unknown" }
//!
//! [[steps]]
//! name = "analysis"
//! type = "parallel"
//! output = "analysis"
//!
//! [[steps.steps]]
//! name = "sentiment"
//! action = "analyze_sentiment"
//! input = "$trigger.message"
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dto::WorkflowStepDto;
use crate::engine::context::{LOOP_VARIABLE, TRIGGER_VARIABLE};
use crate::error::ConfigError;

/// ステップの種類
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// 登録済みアクションの呼び出し（デフォルト）
    #[default]
    Action,
    /// サブステップの並列実行
    Parallel,
    /// 人の判断を待つ
    HumanInLoop,
}

/// タイムアウト時のフォールバック
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    /// `"auto_approve"`: タイムアウトを承認として扱う
    AutoApprove,
    /// タイムアウト時にそのまま出力として使う値
    Value(Value),
}

impl Fallback {
    /// 自動承認を表すキーワード
    pub const AUTO_APPROVE: &'static str = "auto_approve";

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(ref s) if s == Self::AUTO_APPROVE => Fallback::AutoApprove,
            other => Fallback::Value(other),
        }
    }

    /// 定義上の値（シリアライズ用）
    pub fn to_value(&self) -> Value {
        match self {
            Fallback::AutoApprove => Value::String(Self::AUTO_APPROVE.to_string()),
            Fallback::Value(value) => value.clone(),
        }
    }
}

/// ワークフローステップ（ドメインモデル）
///
/// ワークフロー内の1つの処理単位を表します。
///
/// ## DTO との違い
///
/// - `WorkflowStepDto`: TOML デシリアライズ専用
/// - [`StepDefinition`]: バリデーション済み、ロード後は不変
#[derive(Debug, Clone)]
pub struct StepDefinition {
    name: String,
    kind: StepKind,
    action: Option<String>,
    input: Option<Value>,
    output: Option<String>,
    condition: Option<String>,
    timeout: Option<Duration>,
    fallback: Option<Fallback>,
    loop_over: Option<String>,
    steps: Vec<StepDefinition>,
}

impl StepDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// 呼び出すアクション名
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// 未解決の入力（変数参照を含みうる）
    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    /// 結果を格納する変数名
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn fallback(&self) -> Option<&Fallback> {
        self.fallback.as_ref()
    }

    /// `loop` 式
    pub fn loop_over(&self) -> Option<&str> {
        self.loop_over.as_deref()
    }

    /// parallel ステップのサブステップ
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// 自身とすべての子孫ステップ（深さ優先）
    pub fn descendants(&self) -> Vec<&StepDefinition> {
        let mut out = vec![self];
        for sub in &self.steps {
            out.extend(sub.descendants());
        }
        out
    }
}

/// ステップ名が同一リスト内で一意であることを確認
pub(super) fn ensure_unique_names(steps: &[StepDefinition], scope: &str) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.name()) {
            return Err(ConfigError::Validation(format!(
                "{} 内でステップ名 '{}' が重複しています",
                scope,
                step.name()
            )));
        }
    }
    Ok(())
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// バリデーションを実施し、不正なデータの場合は [`ConfigError::Validation`] を返します。
impl TryFrom<WorkflowStepDto> for StepDefinition {
    type Error = ConfigError;

    fn try_from(dto: WorkflowStepDto) -> Result<Self, Self::Error> {
        let name = dto.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::Validation("ステップ名が空です".to_string()));
        }
        let invalid = |reason: &str| ConfigError::Validation(format!("ステップ '{}': {}", name, reason));

        let action = blank_to_none(dto.action);
        let output = blank_to_none(dto.output);
        let condition = blank_to_none(dto.condition);
        let loop_over = blank_to_none(dto.loop_over);

        match dto.kind {
            StepKind::Action if action.is_none() => {
                return Err(invalid("action ステップには action が必要です"));
            }
            StepKind::Parallel if dto.steps.is_empty() => {
                return Err(invalid("parallel ステップには1つ以上のサブステップが必要です"));
            }
            StepKind::Parallel if action.is_some() => {
                return Err(invalid("parallel ステップに action は指定できません"));
            }
            _ => {}
        }
        if dto.kind != StepKind::Parallel && !dto.steps.is_empty() {
            return Err(invalid("サブステップは parallel ステップにのみ指定できます"));
        }
        if dto.kind != StepKind::Action && loop_over.is_some() {
            return Err(invalid("loop は action ステップにのみ指定できます"));
        }
        if dto.timeout == Some(0) {
            return Err(invalid("timeout は1ミリ秒以上を指定してください"));
        }
        if let Some(out) = output.as_deref() {
            if out == TRIGGER_VARIABLE || out == LOOP_VARIABLE {
                return Err(invalid(&format!("output 名 '{}' は予約されています", out)));
            }
        }

        let steps = dto
            .steps
            .into_iter()
            .map(StepDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        ensure_unique_names(&steps, &format!("parallel ステップ '{}'", name))?;

        Ok(Self {
            name,
            kind: dto.kind,
            action,
            input: dto.input,
            output,
            condition,
            timeout: dto.timeout.map(Duration::from_millis),
            fallback: dto.fallback.map(Fallback::from_value),
            loop_over,
            steps,
        })
    }
}

/// ドメインモデルから DTO への変換（書き込み方向）
///
/// バリデーション済みのドメインモデルから DTO を生成するため、
/// この変換は失敗しません（`From` トレイトを使用）。
impl From<StepDefinition> for WorkflowStepDto {
    fn from(step: StepDefinition) -> Self {
        Self {
            name: step.name,
            kind: step.kind,
            action: step.action,
            output: step.output,
            condition: step.condition,
            timeout: step.timeout.map(|t| t.as_millis() as u64),
            loop_over: step.loop_over,
            fallback: step.fallback.map(|f| f.to_value()),
            input: step.input,
            steps: step.steps.into_iter().map(WorkflowStepDto::from).collect(),
        }
    }
}
