//! エンジン設定
//!
//! ```toml
//! [engine]
//! workflows_dir = "workflows"
//! max_parallel_steps = 4
//! default_action_timeout_ms = 30000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// parallel ステップの同時実行数のデフォルト
pub const DEFAULT_MAX_PARALLEL_STEPS: usize = 10;

/// イベントチャネルのバッファサイズのデフォルト
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// ワークフローエンジンの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// ワークフロー定義ファイルを置くディレクトリ
    pub workflows_dir: Option<PathBuf>,
    /// parallel ステップで同時に実行するサブステップの上限（バッチサイズ）
    pub max_parallel_steps: usize,
    /// timeout 未指定の action ステップに適用するタイムアウト（ミリ秒）
    pub default_action_timeout_ms: Option<u64>,
    /// エンジンイベントのブロードキャストバッファ
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflows_dir: None,
            max_parallel_steps: DEFAULT_MAX_PARALLEL_STEPS,
            default_action_timeout_ms: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct EngineConfigFile {
    #[serde(default)]
    engine: EngineConfig,
}

impl EngineConfig {
    /// TOML ファイルから設定を読み込む（`[engine]` テーブル）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let file: EngineConfigFile = toml::from_str(toml)?;
        file.engine.validate()?;
        Ok(file.engine)
    }

    pub fn with_workflows_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workflows_dir = Some(dir.into());
        self
    }

    pub fn with_max_parallel_steps(mut self, max: usize) -> Self {
        self.max_parallel_steps = max;
        self
    }

    pub fn with_default_action_timeout(mut self, timeout: Duration) -> Self {
        self.default_action_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn default_action_timeout(&self) -> Option<Duration> {
        self.default_action_timeout_ms.map(Duration::from_millis)
    }

    /// 設定値の妥当性を確認
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_steps == 0 {
            return Err(ConfigError::Validation(
                "max_parallel_steps は1以上を指定してください".to_string(),
            ));
        }
        if self.default_action_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "default_action_timeout_ms は1以上を指定してください".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Validation("event_buffer は1以上を指定してください".to_string()));
        }
        Ok(())
    }
}
