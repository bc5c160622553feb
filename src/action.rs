//! アクション（ホストが登録する名前付きの処理）
//!
//! # 責務
//!
//! - ステップから呼び出される処理の共通トレイト [`Action`] を定義
//! - 名前からアクションを引くレジストリ [`ActionRegistry`] を提供
//! - 組み込みアクション（`log` / `wait` / `echo`）を提供
//!
//! # モジュール構成
//!
//! - `traits` - 共通インターフェース（[`Action`]トレイト）
//! - `registry` - アクションレジストリ
//! - `builtin` - 組み込みアクション
//!
//! # 使用例
//!
//! ```rust
//! use flowdesk::action::ActionRegistry;
//! use flowdesk::error::ActionError;
//! use serde_json::{json, Value};
//!
//! let registry = ActionRegistry::with_builtins();
//! registry
//!     .register("classify_intent", |input: Value| async move {
//!         let text = input.as_str().unwrap_or_default().to_string();
//!         Ok::<_, ActionError>(json!({"intent": if text.contains("refund") { "refund" } else { "other" }}))
//!     })
//!     .unwrap();
//!
//! assert!(registry.contains("classify_intent"));
//! assert!(registry.contains("log"));
//! ```

pub mod builtin;
pub mod registry;
pub mod traits;

pub use registry::ActionRegistry;
pub use traits::Action;
