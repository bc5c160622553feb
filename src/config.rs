//! ワークフロー定義とエンジン設定
//!
//! # 責務
//!
//! - TOML 形式のワークフロー定義を読み込み、バリデーション済みの
//!   [`WorkflowDefinition`](workflow::WorkflowDefinition) に変換する
//! - エンジン全体の設定 [`EngineConfig`](settings::EngineConfig) を提供する
//!
//! # モジュール構成
//!
//! - `dto` - TOML デシリアライズ専用の生データ（外部非公開）
//! - [`step`] - ステップ定義
//! - [`workflow`] - ワークフロー定義
//! - [`settings`] - エンジン設定

mod dto;
pub mod settings;
pub mod step;
pub mod workflow;

pub use settings::EngineConfig;
pub use step::{Fallback, StepDefinition, StepKind};
pub use workflow::{Trigger, WorkflowDefinition};
