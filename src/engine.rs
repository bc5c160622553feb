//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! - ワークフロー定義とアクションのレジストリを保持
//! - ワークフロー定義を受け取り、各ステップを順序立てて実行
//! - ステップ間のデータ受け渡し（[`RunContext`]）
//! - 条件分岐、繰り返し、タイムアウトとフォールバック
//! - 人の判断待ちの保留と再開
//!
//! # モジュール構成
//!
//! - [`executor`][]: ワークフロー実行エンジン本体
//! - [`context`][]: ラン実行コンテキスト（ステップ間データ受け渡し）
//! - [`expression`][]: 変数参照と条件式の評価
//! - [`registry`][]: ワークフロー定義のレジストリ
//! - [`result`][]: 実行結果型（ステップ&ラン結果）
//! - [`event`][]: エンジンイベント
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use flowdesk::config::EngineConfig;
//! use flowdesk::engine::{EngineEvent, WorkflowEngine};
//! use flowdesk::error::ActionError;
//! use flowdesk::step_executor::HumanDecision;
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. エンジンを生成し、アクションを登録してからワークフローを読み込む
//!     let engine = Arc::new(WorkflowEngine::new(EngineConfig::default()));
//!     for name in ["classify_message", "lookup_customer", "fetch_history", "notify_agent"] {
//!         engine.register_action(name, |input: Value| async move { Ok::<_, ActionError>(input) })?;
//!     }
//!     engine.load_workflow_file("workflows/customer-message.toml")?;
//!
//!     // 2. 人の判断待ちを監視して承認する
//!     let mut events = engine.subscribe();
//!     let responder = Arc::clone(&engine);
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let EngineEvent::HumanReviewRequested(request) = event {
//!                 responder.submit_response(&request.execution_id, &request.step_name, HumanDecision::Approve);
//!             }
//!         }
//!     });
//!
//!     // 3. ワークフローを実行
//!     let run = engine
//!         .execute("customer-message", json!({"message": {"text": "返金したい"}}))
//!         .await?;
//!
//!     // 4. 結果を出力
//!     println!("Workflow: {}", run.workflow_name);
//!     println!("Status: {:?}", run.status);
//!     for step in &run.steps {
//!         println!("  Step {}: {:?}", step.step_name, step.status);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod event;
pub mod executor;
pub mod expression;
pub mod registry;
pub mod result;

// 公開APIの再エクスポート
pub use context::RunContext;
pub use event::EngineEvent;
pub use executor::WorkflowEngine;
pub use registry::WorkflowRegistry;
pub use result::{RunError, RunStatus, StepPhase, StepResult, StepStatus, WorkflowRun};
