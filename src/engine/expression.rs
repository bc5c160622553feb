//! 変数参照と条件式の評価
//!
//! # 責務
//!
//! - `$name.path.to.field` 形式の変数参照を [`RunContext`] に対して解決する
//! - ステップの `input` を再帰的に解決する
//! - `condition` の比較式を評価する
//!
//! # 変数参照
//!
//! - `$` で始まらない文字列はそのままの文字列として扱う
//! - ドット区切りでテーブルのキー、数値セグメントで配列の要素をたどる
//! - 配列・文字列・テーブルに対する `length` は（同名キーがなければ）長さを返す
//! - 解決できないパスは未定義（`None`）であり、エラーにはならない
//!
//! # 条件式
//!
//! ```text
//! <operand> [<op> <operand>]
//! op := ">=" | "<=" | "==" | "!=" | ">" | "<"
//! ```
//!
//! オペランドは変数参照、数値、`'...'` / `"..."` で囲んだ文字列、`true` / `false` / `null`。
//! 演算子がない場合はオペランドの真偽値で評価します。
//! 条件が空、または解析できない場合は `true`（ステップを実行する）として扱います。

use serde_json::Value;

use super::context::RunContext;

const VARIABLE_SIGIL: char = '$';
const LENGTH_SEGMENT: &str = "length";

/// 比較演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Operator {
    // 2文字の演算子を先に照合する
    const TOKENS: [(&'static str, Operator); 6] = [
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        ("==", Operator::Eq),
        ("!=", Operator::Ne),
        (">", Operator::Gt),
        ("<", Operator::Lt),
    ];
}

/// 式を解決する
///
/// # 例
///
/// ```rust
/// use flowdesk::engine::context::RunContext;
/// use flowdesk::engine::expression::resolve;
/// use serde_json::json;
///
/// let ctx = RunContext::new("flow", "exec-1", json!({"items": [1, 2, 3]}));
///
/// assert_eq!(resolve("$trigger.items.1", &ctx), Some(json!(2)));
/// assert_eq!(resolve("$trigger.items.length", &ctx), Some(json!(3)));
/// assert_eq!(resolve("$trigger.missing", &ctx), None);
/// assert_eq!(resolve("plain", &ctx), Some(json!("plain")));
/// ```
pub fn resolve(expr: &str, ctx: &RunContext) -> Option<Value> {
    let expr = expr.trim();
    let Some(path) = expr.strip_prefix(VARIABLE_SIGIL) else {
        return Some(Value::String(expr.to_string()));
    };

    let mut segments = path.split('.').peekable();
    let root = segments.next().filter(|s| !s.is_empty())?;
    let mut current = ctx.get(root)?;

    while let Some(segment) = segments.next() {
        match child(current, segment) {
            Some(next) => current = next,
            None if segment == LENGTH_SEGMENT && segments.peek().is_none() => {
                return length_of(current);
            }
            None => return None,
        }
    }

    Some(current.clone())
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn length_of(value: &Value) -> Option<Value> {
    let len = match value {
        Value::Array(items) => items.len(),
        Value::String(s) => s.chars().count(),
        Value::Object(map) => map.len(),
        _ => return None,
    };
    Some(Value::from(len))
}

/// ステップ入力を再帰的に解決する
///
/// `$` で始まる文字列を変数参照として解決し、テーブルと配列は要素ごとに解決します。
/// 未定義の参照は `null` になります。
pub fn resolve_input(input: &Value, ctx: &RunContext) -> Value {
    match input {
        Value::String(s) if s.trim_start().starts_with(VARIABLE_SIGIL) => {
            resolve(s, ctx).unwrap_or(Value::Null)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), resolve_input(value, ctx)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_input(v, ctx)).collect()),
        other => other.clone(),
    }
}

/// 条件式を評価する
///
/// `None`・空文字列・解析できない式は `true` を返します（解析できない場合は警告ログを出力）。
pub fn evaluate_condition(condition: Option<&str>, ctx: &RunContext) -> bool {
    let Some(condition) = condition.map(str::trim).filter(|c| !c.is_empty()) else {
        return true;
    };

    match evaluate(condition, ctx) {
        Ok(result) => result,
        Err(reason) => {
            tracing::warn!(
                condition = %condition,
                reason = %reason,
                "条件式を解析できないため、ステップを実行します"
            );
            true
        }
    }
}

fn evaluate(condition: &str, ctx: &RunContext) -> Result<bool, String> {
    let Some((left, op, right)) = split_operator(condition)? else {
        return Ok(is_truthy(operand(condition, ctx)?.as_ref()));
    };

    let left = operand(left, ctx)?;
    let right = operand(right, ctx)?;
    Ok(compare(left.as_ref(), op, right.as_ref()))
}

/// 引用符の外にある最初の演算子で分割する
fn split_operator(condition: &str) -> Result<Option<(&str, Operator, &str)>, String> {
    let bytes = condition.as_bytes();
    let mut quote: Option<u8> = None;
    let mut found: Option<(usize, usize, Operator)> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            // 演算子は ASCII のみ。マルチバイト文字の途中では切り出さない
            None if !b.is_ascii() => {}
            None => {
                let rest = &condition[i..];
                if let Some((token, op)) = Operator::TOKENS.iter().find(|(t, _)| rest.starts_with(t)) {
                    if found.is_some() {
                        return Err("演算子が複数あります".to_string());
                    }
                    found = Some((i, token.len(), *op));
                    i += token.len();
                    continue;
                }
                if b == b'=' || b == b'!' {
                    return Err(format!("不正な演算子 '{}'", b as char));
                }
            }
        }
        i += 1;
    }

    if quote.is_some() {
        return Err("引用符が閉じられていません".to_string());
    }

    Ok(found.map(|(at, len, op)| (&condition[..at], op, &condition[at + len..])))
}

/// オペランドを値に変換する（未定義は `None`）
fn operand(token: &str, ctx: &RunContext) -> Result<Option<Value>, String> {
    let token = token.trim();
    if token.is_empty() {
        return Err("オペランドがありません".to_string());
    }
    if token.starts_with(VARIABLE_SIGIL) {
        return Ok(resolve(token, ctx));
    }
    if let Some(inner) = unquote(token) {
        return Ok(Some(Value::String(inner.to_string())));
    }

    let value = match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(n) = token.parse::<i64>() {
                Value::from(n)
            } else if let Some(n) = parse_finite(token) {
                Value::from(n)
            } else {
                Value::String(token.to_string())
            }
        }
    };
    Ok(Some(value))
}

fn unquote(token: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|q| {
        token
            .strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
    })
}

/// `nan` や `inf` は数値として扱わない
fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_finite(s.trim()),
        _ => None,
    }
}

fn compare(left: Option<&Value>, op: Operator, right: Option<&Value>) -> bool {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return match op {
            Operator::Gt => l > r,
            Operator::Lt => l < r,
            Operator::Ge => l >= r,
            Operator::Le => l <= r,
            Operator::Eq => l == r,
            Operator::Ne => l != r,
        };
    }

    // 未定義は null と等しい
    let left = left.unwrap_or(&Value::Null);
    let right = right.unwrap_or(&Value::Null);
    match op {
        Operator::Eq => left == right,
        Operator::Ne => left != right,
        _ => false,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
