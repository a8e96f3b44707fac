//! App - アプリケーション層
//!
//! ports と queue / registry を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **TaskManager**: 状態の所有者（submit / update_status / query / cleanup）
//! - **WorkerPool**: タスク実行ループ（dequeue→Processing→predict→Completed/Failed→ack）
//! - **CleanupScheduler**: 古い record の定期削除
//! - **TaskProcessor**: pool と scheduler の起動・停止
//! - **protocol**: クライアント要求の解釈と即答
//! - **enhance**: event データによる結果拡張

pub mod cleanup;
pub mod enhance;
pub mod manager;
pub mod processor;
pub mod protocol;
pub mod worker_pool;

// 主要な型を再エクスポート
pub use self::cleanup::CleanupScheduler;
pub use self::manager::TaskManager;
pub use self::processor::TaskProcessor;
pub use self::protocol::{handle_message, handle_request};
pub use self::worker_pool::WorkerPool;
