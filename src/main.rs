//! flowdesk CLI
//!
//! ```text
//! flowdesk validate workflows/*.toml
//! flowdesk run workflows/customer-message.toml --trigger '{"message": {"text": "返金したい"}}' --auto-approve
//! flowdesk --config flowdesk.toml run customer-message
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flowdesk::config::{EngineConfig, WorkflowDefinition};
use flowdesk::engine::{EngineEvent, WorkflowEngine};
use flowdesk::error::ActionError;
use flowdesk::step_executor::{HumanDecision, PendingHumanRequest};
use flowdesk::telemetry::{self, LogFormat};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(name = "flowdesk", version, about = "TOML で定義したワークフローを実行します")]
struct Cli {
    /// エンジン設定ファイル（`[engine]` テーブル）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 標準エラーへのログ形式
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// 日次ローテーションのログファイルを出力するディレクトリ
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// ログを詳細にする（-v: debug, -vv: trace）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// ワークフロー定義ファイルを検証する
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// ワークフローを1回実行し、結果を JSON で出力する
    Run {
        /// ワークフロー定義ファイル、または `workflows_dir` 内のワークフロー名
        workflow: String,

        /// トリガーペイロード（JSON）
        #[arg(long, conflicts_with = "trigger_file")]
        trigger: Option<String>,

        /// トリガーペイロードを読み込むファイル（JSON）
        #[arg(long)]
        trigger_file: Option<PathBuf>,

        /// 人の判断待ちをすべて承認する（指定しない場合は標準入力から読む）
        #[arg(long)]
        auto_approve: bool,

        /// 未登録のアクションを入力をそのまま返すスタブとして登録する
        #[arg(long)]
        stub_actions: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match telemetry::init_tracing(
        cli.log_format,
        telemetry::level_from_verbosity(cli.verbose),
        cli.log_dir.as_deref(),
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ログの初期化に失敗しました: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "コマンドが失敗しました");
            eprintln!("エラー: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Validate { files } => Ok(validate(&files)),
        Command::Run {
            workflow,
            trigger,
            trigger_file,
            auto_approve,
            stub_actions,
        } => {
            let trigger = read_trigger(trigger.as_deref(), trigger_file.as_deref())?;
            run_workflow(config, &workflow, trigger, auto_approve, stub_actions).await
        }
    }
}

fn validate(files: &[PathBuf]) -> ExitCode {
    let mut failed = 0;
    for path in files {
        match WorkflowDefinition::from_file(path) {
            Ok(workflow) => println!(
                "OK  {} ({}: {} steps)",
                path.display(),
                workflow.name(),
                workflow.steps().len()
            ),
            Err(e) => {
                failed += 1;
                println!("NG  {}: {}", path.display(), e);
            }
        }
    }

    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn read_trigger(inline: Option<&str>, file: Option<&Path>) -> CliResult<Value> {
    let value = match (inline, file) {
        (Some(json), _) => serde_json::from_str(json)?,
        (None, Some(path)) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        (None, None) => Value::Object(Default::default()),
    };
    Ok(value)
}

async fn run_workflow(
    config: EngineConfig,
    workflow: &str,
    trigger: Value,
    auto_approve: bool,
    stub_actions: bool,
) -> CliResult<ExitCode> {
    let engine = Arc::new(WorkflowEngine::new(config));

    let path = Path::new(workflow);
    let name = if path.is_file() {
        let definition = WorkflowDefinition::from_file(path)?;
        if stub_actions {
            register_stubs(&engine, std::slice::from_ref(&definition))?;
        }
        let name = definition.name().to_string();
        engine.load_workflow(definition)?;
        name
    } else {
        if stub_actions {
            register_stubs(&engine, &definitions_in_dir(engine.config())?)?;
        }
        engine.load_workflows_from_directory()?;
        workflow.to_string()
    };

    // 実行開始より前に購読し、最初の確認依頼を取りこぼさない
    let events = engine.subscribe();
    let responder = tokio::spawn(answer_reviews(Arc::clone(&engine), events, auto_approve));
    let run = engine.execute(&name, trigger).await;
    responder.abort();
    let run = run?;

    println!("{}", run.to_json()?);
    Ok(if run.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn definitions_in_dir(config: &EngineConfig) -> CliResult<Vec<WorkflowDefinition>> {
    let Some(dir) = config.workflows_dir.as_deref().filter(|d| d.is_dir()) else {
        return Ok(Vec::new());
    };
    let mut definitions = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            definitions.push(WorkflowDefinition::from_file(&path)?);
        }
    }
    Ok(definitions)
}

fn register_stubs(engine: &WorkflowEngine, definitions: &[WorkflowDefinition]) -> CliResult<()> {
    for definition in definitions {
        for step in definition.all_steps() {
            let Some(action) = step.action() else { continue };
            if engine.actions().contains(action) {
                continue;
            }
            tracing::warn!(action, "未登録のアクションをスタブとして登録します");
            engine.register_action(action, |input: Value| async move { Ok::<_, ActionError>(input) })?;
        }
    }
    Ok(())
}

/// 人の判断待ちに応答し続ける
async fn answer_reviews(engine: Arc<WorkflowEngine>, mut events: broadcast::Receiver<EngineEvent>, auto_approve: bool) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let request = match events.recv().await {
            Ok(EngineEvent::HumanReviewRequested(request)) => request,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "イベントの受信が追いつかず一部を読み飛ばしました");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let decision = if auto_approve {
            HumanDecision::Approve
        } else {
            match prompt_decision(&request, &mut stdin).await {
                Some(decision) => decision,
                None => HumanDecision::Timeout,
            }
        };
        engine.submit_response(&request.execution_id, &request.step_name, decision);
    }
}

/// 標準入力から判断を読む（EOF なら `None`）
///
/// `approve` / `reject [理由]` / `timeout`、または `{"action": "modify", "data": ...}` 形式の JSON。
async fn prompt_decision(request: &PendingHumanRequest, stdin: &mut Lines<BufReader<Stdin>>) -> Option<HumanDecision> {
    eprintln!(
        "[{}] ステップ '{}' の確認待ち: {}",
        request.workflow_name, request.step_name, request.input
    );

    loop {
        eprint!("approve / reject [理由] / timeout / JSON > ");
        let line = stdin.next_line().await.ok()??;
        let line = line.trim();

        let decision = match line.split_once(' ').map_or((line, ""), |(head, rest)| (head, rest.trim())) {
            ("approve", _) => Some(HumanDecision::Approve),
            ("timeout", _) => Some(HumanDecision::Timeout),
            ("reject", reason) => Some(HumanDecision::Reject {
                reason: (!reason.is_empty()).then(|| reason.to_string()),
            }),
            _ if line.starts_with('{') => serde_json::from_str(line).ok(),
            _ => None,
        };

        match decision {
            Some(decision) => return Some(decision),
            None => eprintln!("入力を解釈できませんでした: {}", line),
        }
    }
}
