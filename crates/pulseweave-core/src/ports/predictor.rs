//! Predictor port - 推論エンジンの抽象化
//!
//! core はアルゴリズムを知らない。入力テキスト（と任意のイベント）を渡し、
//! `Prediction` か `PredictError` を受け取るだけ。失敗の原因は区別しない。

use async_trait::async_trait;

use crate::domain::{EventData, PredictError, Prediction};

/// Predictor turns request input into a structured prediction.
///
/// Retry policy, if any, belongs to the implementation; the worker calls
/// `predict` exactly once per task.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(
        &self,
        text: &str,
        event: Option<&EventData>,
    ) -> Result<Prediction, PredictError>;
}
