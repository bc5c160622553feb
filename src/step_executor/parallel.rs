//! parallel ステップのエグゼキューター
//!
//! サブステップを `max_parallel_steps` 件ずつのバッチに分け、バッチ内は並行に、
//! バッチ同士は順番に実行します。
//!
//! 失敗・タイムアウト・条件によるスキップとなったサブステップは `null` として
//! 結果に含まれ、他のサブステップや後続のバッチは中断されません。

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{Map, Value};

use super::traits::{StepExecutor, StepInvocation, StepOutput};
use crate::config::settings::DEFAULT_MAX_PARALLEL_STEPS;
use crate::config::{StepDefinition, StepKind};
use crate::error::StepError;

#[derive(Debug, Clone)]
pub struct ParallelStepExecutor {
    max_parallel_steps: usize,
}

impl ParallelStepExecutor {
    pub fn new(max_parallel_steps: usize) -> Self {
        Self {
            max_parallel_steps: max_parallel_steps.max(1),
        }
    }
}

impl Default for ParallelStepExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARALLEL_STEPS)
    }
}

#[async_trait]
impl StepExecutor for ParallelStepExecutor {
    fn supports(&self, step: &StepDefinition) -> bool {
        step.kind() == StepKind::Parallel
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        invocation: &StepInvocation<'_>,
    ) -> Result<StepOutput, StepError> {
        if step.steps().is_empty() {
            return Err(StepError::NoSubSteps(step.name().to_string()));
        }

        let mut results = Map::new();
        let mut exports = Vec::new();

        for batch in step.steps().chunks(self.max_parallel_steps) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|sub| invocation.dispatcher.dispatch(sub, invocation.context)),
            )
            .await;

            for (sub, outcome) in batch.iter().zip(outcomes) {
                let value = match outcome {
                    Ok(Some(output)) => {
                        exports.extend(output.exports);
                        if let Some(name) = sub.output() {
                            exports.push((name.to_string(), output.value.clone()));
                        }
                        output.value
                    }
                    Ok(None) => {
                        tracing::debug!(step = step.name(), sub_step = sub.name(), "サブステップをスキップしました");
                        Value::Null
                    }
                    Err(e) => {
                        tracing::warn!(
                            step = step.name(),
                            sub_step = sub.name(),
                            error = %e,
                            "サブステップが失敗したため null として扱います"
                        );
                        Value::Null
                    }
                };
                results.insert(sub.name().to_string(), value);
            }
        }

        Ok(StepOutput {
            value: Value::Object(results),
            exports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowDefinition;
    use crate::engine::context::RunContext;
    use crate::step_executor::traits::testing::EchoDispatcher;
    use serde_json::json;

    fn parallel_step(sub_steps: &str) -> StepDefinition {
        let toml = format!(
            "[workflow]\nname = \"t\"\n\n[[steps]]\nname = \"fan\"\ntype = \"parallel\"\noutput = \"fan\"\n{}",
            sub_steps
        );
        WorkflowDefinition::from_toml(&toml).unwrap().steps()[0].clone()
    }

    async fn run(executor: &ParallelStepExecutor, step: &StepDefinition) -> StepOutput {
        let ctx = RunContext::new("t", "exec-1", Value::Null);
        let invocation = StepInvocation {
            execution_id: "exec-1",
            workflow_name: "t",
            input: &Value::Null,
            context: &ctx,
            dispatcher: &EchoDispatcher,
        };
        executor.execute(step, &invocation).await.unwrap()
    }

    #[tokio::test]
    async fn test_collects_all_sub_steps() {
        let step = parallel_step(
            "[[steps.steps]]\nname = \"a\"\naction = \"echo\"\noutput = \"a\"\n\
             [[steps.steps]]\nname = \"b\"\naction = \"log\"\n",
        );

        let output = run(&ParallelStepExecutor::default(), &step).await;
        assert_eq!(output.value, json!({"a": "echo", "b": "log"}));
        assert_eq!(output.exports, vec![("a".to_string(), json!("echo"))]);
    }

    #[tokio::test]
    async fn test_degraded_sub_steps_are_null() {
        let step = parallel_step(
            "[[steps.steps]]\nname = \"a\"\naction = \"echo\"\n\
             [[steps.steps]]\nname = \"b\"\naction = \"fail\"\noutput = \"b\"\n\
             [[steps.steps]]\nname = \"c\"\naction = \"echo\"\ncondition = \"1 > 2\"\n",
        );

        let output = run(&ParallelStepExecutor::default(), &step).await;
        assert_eq!(output.value, json!({"a": "echo", "b": null, "c": null}));
        assert!(output.exports.is_empty());
    }

    #[tokio::test]
    async fn test_batches_smaller_than_group() {
        let step = parallel_step(
            "[[steps.steps]]\nname = \"a\"\naction = \"echo\"\noutput = \"a\"\n\
             [[steps.steps]]\nname = \"b\"\naction = \"echo\"\noutput = \"b\"\n\
             [[steps.steps]]\nname = \"c\"\naction = \"echo\"\noutput = \"c\"\n",
        );

        let output = run(&ParallelStepExecutor::new(2), &step).await;
        assert_eq!(output.value.as_object().map(|m| m.len()), Some(3));
        let names: Vec<&str> = output.exports.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_zero_parallelism_is_clamped() {
        assert_eq!(ParallelStepExecutor::new(0).max_parallel_steps, 1);
    }
}
