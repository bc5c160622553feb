//! 組み込みアクション
//!
//! [`ActionRegistry::with_builtins`](super::ActionRegistry::with_builtins) で登録されます。
//!
//! | 名前 | 動作 | 出力 |
//! |------|------|------|
//! | `log` | 入力をログに出力 | `{"logged": true}` |
//! | `wait` | `input.duration` ミリ秒待機（デフォルト 1000） | `{"waited": <ms>}` |
//! | `echo` | 入力をそのまま返す | 入力 |

use std::time::Duration;

use serde_json::{Value, json};

use crate::error::ActionError;

/// `wait` の待機時間のデフォルト（ミリ秒）
pub const DEFAULT_WAIT_MS: u64 = 1000;

pub async fn log(input: Value) -> Result<Value, ActionError> {
    tracing::info!(input = %input, "workflow log");
    Ok(json!({ "logged": true }))
}

pub async fn wait(input: Value) -> Result<Value, ActionError> {
    let duration_ms = match input.get("duration") {
        None | Some(Value::Null) => DEFAULT_WAIT_MS,
        Some(value) => value
            .as_u64()
            .ok_or_else(|| ActionError::new(format!("duration が不正です: {}", value)))?,
    };

    tracing::debug!(duration_ms, "待機します");
    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
    Ok(json!({ "waited": duration_ms }))
}

pub async fn echo(input: Value) -> Result<Value, ActionError> {
    Ok(input)
}
