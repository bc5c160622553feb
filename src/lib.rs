//! flowdesk - カスタマーサポート向けワークフロー実行エンジン
//!
//! TOML で宣言したワークフロー（順次・並列ステップ、条件分岐、繰り返し、
//! タイムアウトとフォールバック、人の判断待ち）を非同期に実行します。
//!
//! # モジュール構成
//!
//! - [`config`][]: ワークフロー定義とエンジン設定
//! - [`engine`][]: 実行エンジン本体
//! - [`step_executor`][]: ステップ種別ごとのエグゼキューター
//! - [`action`][]: ホストが登録するアクション
//! - [`error`][]: エラー型
//! - [`telemetry`][]: ログ出力の初期化

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod step_executor;
pub mod telemetry;
