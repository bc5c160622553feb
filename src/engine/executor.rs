//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! このモジュールは、ワークフローの登録と実行を制御する [`WorkflowEngine`] を提供します。
//! 登録済みの定義を名前で引き、トリガーペイロードから [`RunContext`] を作り、
//! 各ステップを順次実行して [`WorkflowRun`] を返します。
//!
//! # 実行フロー
//!
//! 1. ワークフロー定義を名前で取得（未登録なら [`EngineError::WorkflowNotFound`]）
//! 2. `trigger` を格納したコンテキストを生成
//! 3. メインステップを宣言順に実行
//!    - 条件が偽ならスキップとして記録
//!    - `supports` が真となる最初のエグゼキューターに委譲
//!    - 成功したら `output` 名でコンテキストに格納
//!    - 失敗・タイムアウトしたら残りのメインステップを打ち切る
//! 4. 失敗していれば `on_error` フックを実行
//! 5. `on_complete` フックを実行
//! 6. 結果をまとめて返す
//!
//! # 使用例
//!
//! ```rust,no_run
//! use flowdesk::config::EngineConfig;
//! use flowdesk::engine::WorkflowEngine;
//! use flowdesk::error::ActionError;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = WorkflowEngine::new(EngineConfig::default());
//!     engine.register_action("set_confidence", |_input: Value| async {
//!         Ok::<_, ActionError>(json!(0.9))
//!     })?;
//!     engine.load_workflow_file("workflows/cond-flow.toml")?;
//!
//!     let run = engine.execute("cond-flow", json!({})).await?;
//!     println!("{}", run.to_json()?);
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::context::RunContext;
use super::event::EngineEvent;
use super::expression::{evaluate_condition, resolve_input};
use super::registry::WorkflowRegistry;
use super::result::{RunError, RunStatus, StepPhase, StepResult, StepStatus, WorkflowRun};
use crate::action::ActionRegistry;
use crate::config::{EngineConfig, StepDefinition, WorkflowDefinition};
use crate::error::{ActionError, ConfigError, EngineError, StepError};
use crate::step_executor::{
    ActionStepExecutor, HumanDecision, HumanInLoopExecutor, ParallelStepExecutor, PendingHumanRequest,
    StepDispatcher, StepExecutor, StepInvocation, StepOutput,
};

/// 実行 ID の接頭辞
const EXECUTION_ID_PREFIX: &str = "exec-";

/// ワークフロー実行エンジン
///
/// `Arc<WorkflowEngine>` で共有すれば、複数のランを同時に実行できます。
/// 人の判断待ちのランには [`submit_response`](Self::submit_response) で応答します。
pub struct WorkflowEngine {
    config: EngineConfig,
    workflows: WorkflowRegistry,
    actions: ActionRegistry,
    human: Arc<HumanInLoopExecutor>,
    custom_executors: Vec<Arc<dyn StepExecutor>>,
    builtin_executors: Vec<Arc<dyn StepExecutor>>,
    events: broadcast::Sender<EngineEvent>,
}

impl WorkflowEngine {
    /// 組み込みアクションを登録済みのエンジンを生成
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registries(config, WorkflowRegistry::new(), ActionRegistry::with_builtins())
    }

    /// 既存のレジストリを共有するエンジンを生成
    pub fn with_registries(config: EngineConfig, workflows: WorkflowRegistry, actions: ActionRegistry) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let human = Arc::new(HumanInLoopExecutor::new(actions.clone(), events.clone()));

        let mut builtin_executors: Vec<Arc<dyn StepExecutor>> = Vec::new();
        builtin_executors.push(Arc::new(
            ActionStepExecutor::new(actions.clone()).with_default_timeout(config.default_action_timeout()),
        ));
        builtin_executors.push(Arc::new(ParallelStepExecutor::new(config.max_parallel_steps)));
        builtin_executors.push(human.clone());

        Self {
            config,
            workflows,
            actions,
            human,
            custom_executors: Vec::new(),
            builtin_executors,
            events,
        }
    }

    /// 組み込みより先に参照されるエグゼキューターを追加
    pub fn with_executor(mut self, executor: impl StepExecutor + 'static) -> Self {
        self.custom_executors.push(Arc::new(executor));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    /// アクションを登録する（同名は上書き）
    pub fn register_action<F, Fut>(&self, name: &str, action: F) -> Result<(), ConfigError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        self.actions.register(name, action)
    }

    /// ワークフロー定義を登録する
    ///
    /// 未登録のアクションを参照している場合や、同名の定義が登録済みの場合はエラーになります。
    pub fn load_workflow(&self, workflow: WorkflowDefinition) -> Result<(), ConfigError> {
        self.validate_actions(&workflow)?;
        let workflow = self.workflows.insert(workflow)?;
        tracing::info!(
            workflow = workflow.name(),
            steps = workflow.steps().len(),
            "ワークフローを登録しました"
        );
        Ok(())
    }

    /// TOML 文字列からワークフローを登録し、その名前を返す
    pub fn load_workflow_str(&self, toml: &str) -> Result<String, ConfigError> {
        let workflow = WorkflowDefinition::from_toml(toml)?;
        let name = workflow.name().to_string();
        self.load_workflow(workflow)?;
        Ok(name)
    }

    /// TOML ファイルからワークフローを登録し、その名前を返す
    pub fn load_workflow_file(&self, path: impl AsRef<Path>) -> Result<String, ConfigError> {
        let path = path.as_ref();
        let workflow = WorkflowDefinition::from_file(path).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "ワークフローの読み込みに失敗しました");
        })?;
        let name = workflow.name().to_string();
        self.load_workflow(workflow)?;
        Ok(name)
    }

    /// 定義を検証して登録または差し替える
    pub fn reload_workflow(&self, workflow: WorkflowDefinition) -> Result<(), ConfigError> {
        self.validate_actions(&workflow)?;
        let name = workflow.name().to_string();
        if self.workflows.upsert(workflow).is_some() {
            tracing::info!(workflow = %name, "ワークフローを差し替えました");
        } else {
            tracing::info!(workflow = %name, "ワークフローを登録しました");
        }
        Ok(())
    }

    /// `workflows_dir` 直下の `*.toml` をすべて登録し、登録した名前を返す
    ///
    /// `workflows_dir` が未設定または存在しない場合は何もしません。
    pub fn load_workflows_from_directory(&self) -> Result<Vec<String>, ConfigError> {
        let Some(dir) = self.config.workflows_dir.as_deref() else {
            tracing::debug!("workflows_dir が未設定のためスキップします");
            return Ok(Vec::new());
        };
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "ワークフローディレクトリが存在しません");
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut loaded = Vec::with_capacity(paths.len());
        for path in &paths {
            loaded.push(self.load_workflow_file(path)?);
        }

        tracing::info!(dir = %dir.display(), count = loaded.len(), "ワークフローを読み込みました");
        Ok(loaded)
    }

    fn validate_actions(&self, workflow: &WorkflowDefinition) -> Result<(), ConfigError> {
        for step in workflow.all_steps() {
            if let Some(action) = step.action() {
                if !self.actions.contains(action) {
                    return Err(ConfigError::UnknownAction {
                        workflow: workflow.name().to_string(),
                        step: step.name().to_string(),
                        action: action.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// 登録済みのワークフロー名
    pub fn workflow_names(&self) -> Vec<String> {
        self.workflows.names()
    }

    pub fn workflow(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(name)
    }

    /// 人の判断を待っているリクエストの一覧
    pub fn pending_requests(&self) -> Vec<PendingHumanRequest> {
        self.human.pending_requests()
    }

    /// 人の判断を待っているステップに応答する
    ///
    /// 該当するリクエストがない場合は `false` を返します（エラーにはなりません）。
    pub fn submit_response(&self, execution_id: &str, step_name: &str, decision: HumanDecision) -> bool {
        self.human.submit_response(execution_id, step_name, decision)
    }

    /// エンジンイベントの受信者を作成
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// 新しい実行 ID を採番してワークフローを実行する
    pub async fn execute(&self, workflow_name: &str, trigger: Value) -> Result<WorkflowRun, EngineError> {
        let execution_id = format!("{}{}", EXECUTION_ID_PREFIX, Uuid::now_v7());
        self.execute_with_id(workflow_name, execution_id, trigger).await
    }

    /// 実行 ID を指定してワークフローを実行する
    ///
    /// ステップの失敗は `Ok(WorkflowRun { status: Failed, .. })` として返します。
    /// `Err` になるのはワークフローが未登録の場合のみです。
    pub async fn execute_with_id(
        &self,
        workflow_name: &str,
        execution_id: impl Into<String>,
        trigger: Value,
    ) -> Result<WorkflowRun, EngineError> {
        let workflow = self
            .workflows
            .get(workflow_name)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_name.to_string()))?;
        let execution_id = execution_id.into();

        let mut ctx = RunContext::new(workflow.name(), execution_id.as_str(), trigger);
        let started_at = ctx.started_at();
        tracing::info!(execution_id = %execution_id, workflow = workflow.name(), "ワークフローを開始します");
        let _ = self.events.send(EngineEvent::RunStarted {
            execution_id: execution_id.clone(),
            workflow_name: workflow.name().to_string(),
        });

        let mut steps = Vec::new();
        let mut error = self
            .run_steps(workflow.steps(), StepPhase::Main, &mut ctx, &mut steps)
            .await;

        if error.is_some() && !workflow.on_error().is_empty() {
            tracing::info!(execution_id = %execution_id, "on_error フックを実行します");
            let hook_error = self
                .run_steps(workflow.on_error(), StepPhase::OnError, &mut ctx, &mut steps)
                .await;
            error = error.or(hook_error);
        }

        let hook_error = self
            .run_steps(workflow.on_complete(), StepPhase::OnComplete, &mut ctx, &mut steps)
            .await;
        error = error.or(hook_error);

        let status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let completed_at = SystemTime::now();
        let duration = completed_at
            .duration_since(started_at)
            .unwrap_or(Duration::from_secs(0));

        match &error {
            None => tracing::info!(
                execution_id = %execution_id,
                workflow = workflow.name(),
                duration_ms = duration.as_millis() as u64,
                "ワークフローが完了しました"
            ),
            Some(e) => tracing::warn!(
                execution_id = %execution_id,
                workflow = workflow.name(),
                step = %e.step,
                error = %e.message,
                "ワークフローが失敗しました"
            ),
        }
        let _ = self.events.send(EngineEvent::RunFinished {
            execution_id: execution_id.clone(),
            workflow_name: workflow.name().to_string(),
            status,
        });

        Ok(WorkflowRun {
            execution_id,
            workflow_name: workflow.name().to_string(),
            status,
            steps,
            output: ctx.outputs(),
            error,
            started_at,
            completed_at,
            duration,
        })
    }

    /// ステップ列を順に実行し、最初の失敗を返す
    async fn run_steps(
        &self,
        steps: &[StepDefinition],
        phase: StepPhase,
        ctx: &mut RunContext,
        results: &mut Vec<StepResult>,
    ) -> Option<RunError> {
        for step in steps {
            let (result, output) = self.run_step(step, phase, ctx).await;

            let failure = matches!(result.status, StepStatus::Failed | StepStatus::Timeout).then(|| RunError {
                step: step.name().to_string(),
                message: result.error.clone().unwrap_or_default(),
            });
            results.push(result);
            if failure.is_some() {
                return failure;
            }

            if let Some(output) = output {
                for (name, value) in output.exports {
                    ctx.set_output(&name, value);
                }
                if let Some(name) = step.output() {
                    ctx.set_output(name, output.value);
                }
            }
        }
        None
    }

    /// 1ステップを実行して結果を記録する
    async fn run_step(
        &self,
        step: &StepDefinition,
        phase: StepPhase,
        ctx: &RunContext,
    ) -> (StepResult, Option<StepOutput>) {
        if !evaluate_condition(step.condition(), ctx) {
            tracing::info!(step = step.name(), condition = ?step.condition(), "条件を満たさないためスキップします");
            return (StepResult::skipped(step.name(), phase), None);
        }

        let started_at = SystemTime::now();
        let input = resolve_step_input(step, ctx);
        tracing::debug!(step = step.name(), phase = ?phase, kind = ?step.kind(), "ステップを実行します");

        let recorded_input = step.input().map(|_| input.clone());
        match self.invoke(step, ctx, &input).await {
            Ok(output) => {
                let result = StepResult::completed(step.name(), phase, recorded_input, output.value.clone(), started_at);
                tracing::info!(
                    step = step.name(),
                    duration_ms = result.duration.as_millis() as u64,
                    "ステップが完了しました"
                );
                (result, Some(output))
            }
            Err(e) => {
                tracing::error!(step = step.name(), error = %e, "ステップが失敗しました");
                (StepResult::failed(step.name(), phase, recorded_input, &e, started_at), None)
            }
        }
    }

    /// ステップを処理できるエグゼキューターに委譲する
    async fn invoke(&self, step: &StepDefinition, ctx: &RunContext, input: &Value) -> Result<StepOutput, StepError> {
        let executor = self
            .custom_executors
            .iter()
            .chain(&self.builtin_executors)
            .find(|executor| executor.supports(step))
            .ok_or_else(|| StepError::NoExecutor(step.name().to_string()))?;

        let invocation = StepInvocation {
            execution_id: ctx.execution_id(),
            workflow_name: ctx.workflow_name(),
            input,
            context: ctx,
            dispatcher: self,
        };
        executor.execute(step, &invocation).await
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[async_trait]
impl StepDispatcher for WorkflowEngine {
    async fn dispatch(
        &self,
        step: &StepDefinition,
        context: &RunContext,
    ) -> Result<Option<StepOutput>, StepError> {
        if !evaluate_condition(step.condition(), context) {
            return Ok(None);
        }
        let input = resolve_step_input(step, context);
        self.invoke(step, context, &input).await.map(Some)
    }
}

fn resolve_step_input(step: &StepDefinition, ctx: &RunContext) -> Value {
    step.input()
        .map(|raw| resolve_input(raw, ctx))
        .unwrap_or(Value::Null)
}
