//! ステップエグゼキューターの共通インターフェース定義

use async_trait::async_trait;
use serde_json::Value;

use crate::config::StepDefinition;
use crate::engine::context::RunContext;
use crate::error::StepError;

/// ステップ種別ごとの処理
///
/// # 実装要件
///
/// - `Send + Sync`: 複数のランから同時に呼び出される
/// - 非同期実行対応（`async_trait`を使用）
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// このエグゼキューターがステップを処理できるか
    fn supports(&self, step: &StepDefinition) -> bool;

    /// ステップを実行する
    ///
    /// 条件式の評価と結果の記録はエンジンが行うため、ここでは扱いません。
    async fn execute(
        &self,
        step: &StepDefinition,
        invocation: &StepInvocation<'_>,
    ) -> Result<StepOutput, StepError>;
}

/// サブステップの実行をエンジンに委ねるためのインターフェース
#[async_trait]
pub trait StepDispatcher: Send + Sync {
    /// 条件式を評価したうえでサブステップを実行する
    ///
    /// 条件が偽の場合は `Ok(None)` を返します。
    async fn dispatch(
        &self,
        step: &StepDefinition,
        context: &RunContext,
    ) -> Result<Option<StepOutput>, StepError>;
}

/// 1回のステップ実行に渡される情報
pub struct StepInvocation<'a> {
    pub execution_id: &'a str,
    pub workflow_name: &'a str,
    /// 解決済みの入力（`input` 未指定なら `null`）
    pub input: &'a Value,
    pub context: &'a RunContext,
    pub dispatcher: &'a dyn StepDispatcher,
}

/// ステップの実行結果
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// ステップの `output` 名に格納される値
    pub value: Value,
    /// 追加でコンテキストに書き込む値（parallel のサブステップ出力）
    pub exports: Vec<(String, Value)>,
}

impl StepOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            exports: Vec::new(),
        }
    }

    pub fn with_export(mut self, name: impl Into<String>, value: Value) -> Self {
        self.exports.push((name.into(), value));
        self
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! エグゼキューター単体テスト用の最小ディスパッチャー

    use super::*;
    use crate::config::StepKind;

    /// サブステップのアクション名をそのまま出力し、`fail` なら失敗させる
    pub(crate) struct EchoDispatcher;

    #[async_trait]
    impl StepDispatcher for EchoDispatcher {
        async fn dispatch(
            &self,
            step: &StepDefinition,
            context: &RunContext,
        ) -> Result<Option<StepOutput>, StepError> {
            if !crate::engine::expression::evaluate_condition(step.condition(), context) {
                return Ok(None);
            }
            match (step.kind(), step.action()) {
                (StepKind::Action, Some("fail")) => Err(StepError::UnknownAction("fail".to_string())),
                (_, action) => Ok(Some(StepOutput::new(Value::from(action.unwrap_or_default())))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_output_exports() {
        let output = StepOutput::new(json!({"a": 1}))
            .with_export("a", json!(1))
            .with_export("b", json!(2));

        assert_eq!(output.value, json!({"a": 1}));
        assert_eq!(output.exports.len(), 2);
        assert_eq!(output.exports[1], ("b".to_string(), json!(2)));
    }
}
