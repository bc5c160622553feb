//! ログ出力の初期化
//!
//! - 標準エラーへテキストまたは JSON で出力
//! - `log_dir` を指定した場合は日次ローテーションのファイルにも JSON で出力

use std::path::Path;

use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{Layer, fmt};

/// ログファイル名の接頭辞（`flowdesk.log.YYYY-MM-DD`）
const LOG_FILE_PREFIX: &str = "flowdesk.log";

/// 標準エラーへのログ形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `-v` の回数からログレベルを決める
pub fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// グローバルな tracing サブスクライバーを設定する
///
/// ファイル出力を有効にした場合、返された [`WorkerGuard`] をプロセス終了まで保持してください。
/// ドロップするとバッファ済みのログが書き出されなくなります。
pub fn init_tracing(
    format: LogFormat,
    level: LevelFilter,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>, TryInitError> {
    let stderr_layer = match format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(level)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
