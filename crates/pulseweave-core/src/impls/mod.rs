//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **ChannelSink**: mpsc チャネルへの配送先
//! - **KeywordPredictor**: キーワード一致の Predictor
//!
//! 本物の推論エンジン（LLM プロバイダ）や WebSocket transport は別クレートに置く。

pub mod channel_sink;
pub mod keyword_predictor;

pub use self::channel_sink::ChannelSink;
pub use self::keyword_predictor::KeywordPredictor;
