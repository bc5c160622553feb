//! ラン実行コンテキストの管理
//!
//! # 責務
//!
//! - トリガーペイロードを `trigger` として保持
//! - 各ステップの `output` 名に結果を格納（後勝ち）
//! - 後続ステップの `input` / `condition` / `loop` 式から参照される値を提供
//!
//! # 使用例
//!
//! ```rust
//! use flowdesk::engine::context::RunContext;
//! use serde_json::json;
//!
//! let mut ctx = RunContext::new("cond-flow", "exec-1", json!({"message": "hi"}));
//! ctx.set_output("confidence", json!(0.9));
//!
//! assert_eq!(ctx.get("confidence"), Some(&json!(0.9)));
//! assert_eq!(ctx.get("trigger"), Some(&json!({"message": "hi"})));
//! ```

use std::collections::HashMap;
use std::time::SystemTime;

use serde_json::{Map, Value};

/// トリガーペイロードを格納する予約変数名
pub const TRIGGER_VARIABLE: &str = "trigger";

/// `loop` の各要素を束縛する予約変数名
pub const LOOP_VARIABLE: &str = "item";

/// ラン実行コンテキスト
///
/// 1回のワークフロー実行の間だけ存在し、ステップ間のデータ受け渡しに使用します。
#[derive(Debug, Clone)]
pub struct RunContext {
    workflow_name: String,
    execution_id: String,
    started_at: SystemTime,
    variables: HashMap<String, Value>,
    // 最初に書き込まれた順
    output_names: Vec<String>,
}

impl RunContext {
    /// トリガーペイロードを `trigger` に格納した新しいコンテキストを生成
    pub fn new(workflow_name: impl Into<String>, execution_id: impl Into<String>, trigger: Value) -> Self {
        let mut variables = HashMap::new();
        variables.insert(TRIGGER_VARIABLE.to_string(), trigger);

        Self {
            workflow_name: workflow_name.into(),
            execution_id: execution_id.into(),
            started_at: SystemTime::now(),
            variables,
            output_names: Vec::new(),
        }
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// 変数を取得
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// ステップの出力を格納
    ///
    /// 同名の出力が既にある場合は上書きします。
    pub fn set_output(&mut self, name: &str, value: Value) {
        if !self.output_names.iter().any(|n| n == name) {
            self.output_names.push(name.to_string());
        }
        self.variables.insert(name.to_string(), value);
    }

    /// 一時的な変数を束縛したコンテキストを返す
    ///
    /// `loop` の `item` のように、元のコンテキストへ書き戻さない値に使用します。
    pub fn with_binding(&self, name: &str, value: Value) -> RunContext {
        let mut scoped = self.clone();
        scoped.variables.insert(name.to_string(), value);
        scoped
    }

    /// 名前付き出力のみを返す（`trigger` は含まない）
    pub fn outputs(&self) -> Map<String, Value> {
        self.output_names
            .iter()
            .filter_map(|name| self.variables.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}
