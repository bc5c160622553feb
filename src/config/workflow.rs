//! Workflow 定義の読み込みと管理を行うモジュール
//!
//! # 責務
//!
//! このモジュールは、サポート業務のワークフローを TOML 形式で定義し、
//! それを Rust の型として扱うための機能を提供します。
//!
//! ## 主な機能
//!
//! - **TOML パース**: `workflows/` ディレクトリ内の TOML ファイルを読み込み、
//!   [`WorkflowDefinition`] にデシリアライズ
//! - **ワークフロー定義**: 「メッセージ受信→分類→エスカレーション判断→人の確認→通知」
//!   のような業務フローをステップの連鎖として表現
//! - **完了フック**: `on_complete` / `on_error` のステップ列を保持
//!
//! ## 使用例
//!
//! ```toml
//! [workflow]
//! name = "customer-message"
//! description = "顧客メッセージの一次対応"
//!
//! [workflow.trigger]
//! type = "im_message"
//! channel = "feishu"
//!
//! [[steps]]
//! name = "classify"
//! action = "classify_intent"
//! input = "$trigger.message"
//! output = "intent"
//!
//! [[on_complete]]
//! name = "notify"
//! action = "log"
//! ```
//!
//! ## 関連モジュール
//!
//! - [`crate::config::step`]: 各ステップの定義
//! - [`crate::engine::executor`]: ワークフローの実行エンジン

use std::path::Path;

use super::dto::{TriggerDto, WorkflowDto, WorkflowMetadataDto, WorkflowStepDto};
use super::step::{ensure_unique_names, StepDefinition};
use crate::error::ConfigError;

/// トリガー記述子
///
/// エンジンは解釈しません。ホストがどのイベントでワークフローを起動するかを決めるための情報です。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// `im_message` / `webhook` / `schedule` / `manual` など
    pub kind: String,
    pub channel: Option<String>,
    pub event: Option<String>,
    pub schedule: Option<String>,
}

/// ワークフロー定義（ドメインモデル）
///
/// バリデーション済みの状態を保証します。ロード後は変更されません。
///
/// ## DTO との違い
///
/// - `WorkflowDto`: TOML デシリアライズ専用、バリデーション前の生データ
/// - [`WorkflowDefinition`]: バリデーション済み
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    description: Option<String>,
    version: Option<String>,
    trigger: Trigger,
    steps: Vec<StepDefinition>,
    on_complete: Vec<StepDefinition>,
    on_error: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// TOML ファイルからワークフローを読み込む
    ///
    /// # 処理フロー
    ///
    /// 1. ファイル読み込み
    /// 2. TOML デシリアライズ → `WorkflowDto`
    /// 3. バリデーション & 変換 → [`WorkflowDefinition`]
    ///
    /// # エラー
    ///
    /// ファイルの読み込み、パース、バリデーションのいずれかに失敗した場合は [`ConfigError`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// TOML 文字列からワークフローを読み込む
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let dto: WorkflowDto = toml::from_str(toml)?;
        Self::try_from(dto)
    }

    /// ワークフローを TOML 文字列に変換
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let dto = WorkflowDto::from(self.clone());
        Ok(toml::to_string(&dto)?)
    }

    /// ワークフローを TOML ファイルに保存
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// メインのステップ列（宣言順）
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn on_complete(&self) -> &[StepDefinition] {
        &self.on_complete
    }

    pub fn on_error(&self) -> &[StepDefinition] {
        &self.on_error
    }

    /// すべてのステップ（フック・サブステップを含む）
    pub fn all_steps(&self) -> Vec<&StepDefinition> {
        self.steps
            .iter()
            .chain(&self.on_error)
            .chain(&self.on_complete)
            .flat_map(StepDefinition::descendants)
            .collect()
    }
}

fn convert_steps(steps: Vec<WorkflowStepDto>) -> Result<Vec<StepDefinition>, ConfigError> {
    steps.into_iter().map(StepDefinition::try_from).collect()
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// # 処理フロー
///
/// 1. メタデータのバリデーション
/// 2. ステップの変換（`WorkflowStepDto` → [`StepDefinition`]）
/// 3. ステップ名の一意性チェック
impl TryFrom<WorkflowDto> for WorkflowDefinition {
    type Error = ConfigError;

    fn try_from(dto: WorkflowDto) -> Result<Self, Self::Error> {
        let name = dto.workflow.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::Validation("ワークフロー名が空です".to_string()));
        }
        if dto.steps.is_empty() {
            return Err(ConfigError::Validation(format!(
                "ワークフロー '{}' には1つ以上のステップが必要です (at least one step)",
                name
            )));
        }

        let steps = convert_steps(dto.steps)?;
        let on_complete = convert_steps(dto.on_complete)?;
        let on_error = convert_steps(dto.on_error)?;
        ensure_unique_names(&steps, &format!("ワークフロー '{}' の steps", name))?;
        ensure_unique_names(&on_complete, &format!("ワークフロー '{}' の on_complete", name))?;
        ensure_unique_names(&on_error, &format!("ワークフロー '{}' の on_error", name))?;

        let trigger = dto.workflow.trigger;
        Ok(Self {
            name,
            description: dto.workflow.description,
            version: dto.workflow.version,
            trigger: Trigger {
                kind: trigger.kind,
                channel: trigger.channel,
                event: trigger.event,
                schedule: trigger.schedule,
            },
            steps,
            on_complete,
            on_error,
        })
    }
}

/// ドメインモデルから DTO への変換（書き込み方向）
impl From<WorkflowDefinition> for WorkflowDto {
    fn from(workflow: WorkflowDefinition) -> Self {
        Self {
            workflow: WorkflowMetadataDto {
                name: workflow.name,
                description: workflow.description,
                version: workflow.version,
                trigger: TriggerDto {
                    kind: workflow.trigger.kind,
                    channel: workflow.trigger.channel,
                    event: workflow.trigger.event,
                    schedule: workflow.trigger.schedule,
                },
            },
            steps: workflow.steps.into_iter().map(WorkflowStepDto::from).collect(),
            on_complete: workflow.on_complete.into_iter().map(WorkflowStepDto::from).collect(),
            on_error: workflow.on_error.into_iter().map(WorkflowStepDto::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::step::StepKind;

    /// テスト用のワークフローを作成するヘルパー関数
    fn create_test_workflow_toml(step_count: usize) -> String {
        let mut toml = String::from(
            "[workflow]\n\
             name = \"test_workflow\"\n\
             description = \"Test workflow\"\n\
             version = \"1.0.0\"\n\n",
        );

        for i in 0..step_count {
            toml.push_str(&format!(
                "[[steps]]\n\
                 name = \"step{}\"\n\
                 action = \"echo\"\n\
                 input = \"value {}\"\n\n",
                i + 1,
                i + 1
            ));
        }

        toml
    }

    #[test]
    fn test_from_toml() {
        let workflow = WorkflowDefinition::from_toml(&create_test_workflow_toml(3)).unwrap();

        assert_eq!(workflow.name(), "test_workflow");
        assert_eq!(workflow.description(), Some("Test workflow"));
        assert_eq!(workflow.version(), Some("1.0.0"));
        assert_eq!(workflow.steps().len(), 3);
        assert!(workflow.on_complete().is_empty());
        assert_eq!(workflow.trigger().kind, "manual");
    }

    #[test]
    fn test_trigger_and_hooks() {
        let toml = "[workflow]\nname = \"hooks\"\n\
                    [workflow.trigger]\ntype = \"im_message\"\nchannel = \"feishu\"\n\
                    [[steps]]\nname = \"a\"\naction = \"echo\"\n\
                    [[on_error]]\nname = \"alert\"\naction = \"log\"\n\
                    [[on_complete]]\nname = \"done\"\naction = \"log\"\noutput = \"done\"\n";
        let workflow = WorkflowDefinition::from_toml(toml).unwrap();

        assert_eq!(workflow.trigger().kind, "im_message");
        assert_eq!(workflow.trigger().channel.as_deref(), Some("feishu"));
        assert_eq!(workflow.on_error()[0].name(), "alert");
        assert_eq!(workflow.on_complete()[0].output(), Some("done"));
        assert_eq!(workflow.all_steps().len(), 3);
    }

    #[test]
    fn test_rejects_empty_steps() {
        let err = WorkflowDefinition::from_toml("[workflow]\nname = \"bad\"\n").unwrap_err();

        assert!(err.to_string().contains("at least one step"));
    }

    #[test]
    fn test_rejects_duplicate_step_names() {
        let toml = "[workflow]\nname = \"dup\"\n\
                    [[steps]]\nname = \"a\"\naction = \"echo\"\n\
                    [[steps]]\nname = \"a\"\naction = \"log\"\n";
        let err = WorkflowDefinition::from_toml(toml).unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_hook_names_may_repeat_main_names() {
        let toml = "[workflow]\nname = \"ok\"\n\
                    [[steps]]\nname = \"log\"\naction = \"log\"\n\
                    [[on_complete]]\nname = \"log\"\naction = \"log\"\n";
        assert!(WorkflowDefinition::from_toml(toml).is_ok());
    }

    #[test]
    fn test_roundtrip_with_nested_steps() {
        let toml = "[workflow]\nname = \"round\"\n\
                    [[steps]]\nname = \"fan\"\ntype = \"parallel\"\noutput = \"fan\"\n\
                    [[steps.steps]]\nname = \"a\"\naction = \"echo\"\ninput = { text = \"$trigger.text\" }\n\
                    [[steps.steps]]\nname = \"b\"\naction = \"wait\"\ntimeout = 20\nfallback = \"late\"\n\
                    [[steps]]\nname = \"review\"\ntype = \"human_in_loop\"\nfallback = \"auto_approve\"\n";
        let original = WorkflowDefinition::from_toml(toml).unwrap();

        let restored = WorkflowDefinition::from_toml(&original.to_toml_string().unwrap()).unwrap();

        assert_eq!(restored.name(), "round");
        assert_eq!(restored.steps()[0].kind(), StepKind::Parallel);
        assert_eq!(restored.steps()[0].steps().len(), 2);
        assert_eq!(restored.steps()[0].steps()[1].timeout(), original.steps()[0].steps()[1].timeout());
        assert_eq!(restored.steps()[1].fallback(), original.steps()[1].fallback());
    }

    #[test]
    fn test_to_file_and_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.toml");
        let workflow = WorkflowDefinition::from_toml(&create_test_workflow_toml(2)).unwrap();

        workflow.to_file(&path).unwrap();
        let loaded = WorkflowDefinition::from_file(&path).unwrap();

        assert_eq!(loaded.name(), "test_workflow");
        assert_eq!(loaded.steps().len(), 2);
    }

    #[test]
    fn test_from_file_missing() {
        let err = WorkflowDefinition::from_file("/nonexistent/flow.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(_)));
    }
}
