//! pulseweave-core
//!
//! Async inference task queue: clients submit requests over a connection, a
//! bounded worker pool runs them through a `Predictor`, and lifecycle
//! notifications are pushed back to the submitting connection.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, request, outcome, events, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, Predictor, DeliverySink）
//! - **queue**: task table と FIFO queue
//! - **registry** / **dispatch**: 接続管理と通知配送
//! - **app**: アプリケーションロジック（manager, worker_pool, cleanup, processor, protocol）
//! - **impls**: 実装（KeywordPredictor, ChannelSink）
//! - **config**: 設定の読み込み
//! - **observability**: 統計スナップショット

pub mod app;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod registry;

pub use app::{TaskManager, TaskProcessor};
pub use config::PulseConfig;
pub use observability::TaskStats;
