//! アクションの共通インターフェース定義

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ActionError;

/// ステップから呼び出されるアクション
///
/// 解決済みの入力を受け取り、ステップの出力となる値を返します。
///
/// # 実装要件
///
/// - `Send + Sync`: 複数のランから同時に呼び出される
/// - 非同期実行対応（`async_trait`を使用）
///
/// `Fn(Value) -> impl Future<Output = Result<Value, ActionError>>` を満たすクロージャや
/// `async fn` はそのままアクションとして扱えます。
#[async_trait]
pub trait Action: Send + Sync {
    async fn call(&self, input: Value) -> Result<Value, ActionError>;
}

#[async_trait]
impl<F, Fut> Action for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    async fn call(&self, input: Value) -> Result<Value, ActionError> {
        (self)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Doubler;

    #[async_trait]
    impl Action for Doubler {
        async fn call(&self, input: Value) -> Result<Value, ActionError> {
            let n = input.as_i64().ok_or_else(|| ActionError::new("数値が必要です"))?;
            Ok(json!(n * 2))
        }
    }

    #[tokio::test]
    async fn test_closure_is_action() {
        let action = |input: Value| async move { Ok::<_, ActionError>(json!({"got": input})) };
        let result = action.call(json!(1)).await.unwrap();
        assert_eq!(result, json!({"got": 1}));
    }

    #[tokio::test]
    async fn test_struct_action() {
        let action: Box<dyn Action> = Box::new(Doubler);

        assert_eq!(action.call(json!(21)).await.unwrap(), json!(42));
        let err = action.call(json!("x")).await.unwrap_err();
        assert_eq!(err.message(), "数値が必要です");
    }
}
