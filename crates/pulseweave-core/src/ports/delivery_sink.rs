//! DeliverySink port - 接続ごとの通知配送先
//!
//! transport（WebSocket など）はこの trait を実装して registry に登録する。
//! 配送は best-effort: Err を返した接続は registry 側で切断扱いになる。

use async_trait::async_trait;

use crate::domain::{DeliveryError, ServerMessage};

#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, message: &ServerMessage) -> Result<(), DeliveryError>;
}
