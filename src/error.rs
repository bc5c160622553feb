//! エラー型の定義
//!
//! このモジュールは、flowdesk 全体で使用されるエラー型を定義します。
//!
//! - [`ConfigError`]: ワークフロー定義・エンジン設定の読み込み時のエラー（ロード時にのみ発生）
//! - [`EngineError`]: エンジン API の構造的な誤用（未登録ワークフローの実行など）
//! - [`StepError`]: ステップ実行時の失敗（実行結果の `failed` / `timeout` として記録される）
//! - [`ActionError`]: ホストが登録したアクションの失敗

use std::time::Duration;

use thiserror::Error;

/// 設定関連のエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// ファイルの読み込みに失敗
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    FileRead(#[from] std::io::Error),

    /// TOML のデシリアライズに失敗
    #[error("TOML のデシリアライズに失敗しました: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    /// TOML のシリアライズに失敗
    #[error("TOML のシリアライズに失敗しました: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// バリデーションエラー
    #[error("設定のバリデーションに失敗しました: {0}")]
    Validation(String),

    /// 未登録アクションへの参照
    #[error("ワークフロー '{workflow}' のステップ '{step}' が未登録のアクション '{action}' を参照しています")]
    UnknownAction {
        workflow: String,
        step: String,
        action: String,
    },

    /// 同名のワークフローが登録済み
    #[error("ワークフロー '{0}' は既に登録されています")]
    DuplicateWorkflow(String),
}

/// エンジン API のエラー
///
/// 通常のステップ失敗はここには現れず、[`WorkflowRun`](crate::engine::WorkflowRun) の
/// `status: failed` として返されます。
#[derive(Debug, Error)]
pub enum EngineError {
    /// 定義エラー
    #[error("定義エラー: {0}")]
    Config(#[from] ConfigError),

    /// 未登録のワークフロー
    #[error("ワークフロー '{0}' が見つかりません")]
    WorkflowNotFound(String),
}

/// ステップ実行時のエラー
#[derive(Debug, Error)]
pub enum StepError {
    /// アクションが失敗
    #[error("アクション '{action}' が失敗しました: {source}")]
    ActionFailed {
        action: String,
        #[source]
        source: ActionError,
    },

    /// アクション名の指定がない
    #[error("ステップ '{0}' にアクションが指定されていません")]
    MissingAction(String),

    /// アクションが未登録
    #[error("未登録のアクションです: {0}")]
    UnknownAction(String),

    /// タイムアウト（フォールバックなし）
    #[error("タイムアウト: ステップ '{step_name}' が {}ms 以内に完了しませんでした", .timeout.as_millis())]
    Timeout { step_name: String, timeout: Duration },

    /// 人による却下
    #[error("human rejected: {reason}")]
    HumanRejected { step_name: String, reason: String },

    /// 人の判断待ちがタイムアウトし、auto_approve も指定されていない
    #[error("ステップ '{0}' の人による確認がタイムアウトしました")]
    HumanTimedOut(String),

    /// 応答を待たずに保留中リクエストが破棄された
    #[error("ステップ '{0}' の保留中リクエストが応答なしで破棄されました")]
    HumanAborted(String),

    /// parallel ステップにサブステップがない
    #[error("parallel ステップ '{0}' にサブステップがありません")]
    NoSubSteps(String),

    /// loop 式が配列に解決されなかった
    #[error("ステップ '{step_name}' の loop 式 '{expression}' が配列ではありません")]
    NotIterable {
        step_name: String,
        expression: String,
    },

    /// ステップを処理できるエグゼキューターがない
    #[error("ステップ '{0}' を処理できるエグゼキューターがありません")]
    NoExecutor(String),
}

impl StepError {
    /// タイムアウト起因の失敗かどうか
    ///
    /// `true` の場合、ステップ結果のステータスは `timeout` として記録されます。
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::Timeout { .. } | StepError::HumanTimedOut(_))
    }
}

/// ホストが登録したアクションの失敗
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_from_config_error() {
        let err = EngineError::from(ConfigError::Validation("ステップがありません".to_string()));

        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(
            err.to_string(),
            "定義エラー: 設定のバリデーションに失敗しました: ステップがありません"
        );
    }

    #[test]
    fn test_step_error_timeout_message() {
        let err = StepError::Timeout {
            step_name: "classify".to_string(),
            timeout: Duration::from_millis(250),
        };

        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "タイムアウト: ステップ 'classify' が 250ms 以内に完了しませんでした"
        );
    }

    #[test]
    fn test_human_rejected_contains_reason() {
        let err = StepError::HumanRejected {
            step_name: "review".to_string(),
            reason: "内容が不正確".to_string(),
        };

        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "human rejected: 内容が不正確");
    }

    #[test]
    fn test_action_failed_keeps_source() {
        let err = StepError::ActionFailed {
            action: "send_message".to_string(),
            source: ActionError::from("channel closed"),
        };

        assert_eq!(
            err.to_string(),
            "アクション 'send_message' が失敗しました: channel closed"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
