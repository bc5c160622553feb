//! ステップ種別ごとのエグゼキューター
//!
//! # 責務
//!
//! - ステップ種別ごとの処理を共通トレイト [`StepExecutor`] で抽象化
//! - 組み込みエグゼキューター（action / parallel / human_in_loop）を提供
//!
//! # モジュール構成
//!
//! - `traits` - 共通インターフェース（[`StepExecutor`] / [`StepDispatcher`] / [`StepInvocation`]）
//! - `action` - 登録済みアクションの呼び出し（タイムアウト・フォールバック・loop）
//! - `parallel` - サブステップのバッチ並列実行
//! - `human_in_loop` - 人の判断を待つステップと保留中リクエストのテーブル
//!
//! エンジンは `supports` が `true` を返す最初のエグゼキューターにステップを渡します。
//! ホストは [`WorkflowEngine::with_executor`](crate::engine::WorkflowEngine::with_executor)
//! で独自のエグゼキューターを追加できます。

pub mod action;
pub mod human_in_loop;
pub mod parallel;
pub mod traits;

pub use action::ActionStepExecutor;
pub use human_in_loop::{CorrelationKey, HumanDecision, HumanInLoopExecutor, PendingHumanRequest};
pub use parallel::ParallelStepExecutor;
pub use traits::{StepDispatcher, StepExecutor, StepInvocation, StepOutput};
