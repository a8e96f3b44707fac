//! ChannelSink - tokio mpsc を使った配送先
//!
//! # 用途
//! - transport 側は受信側 (`UnboundedReceiver`) を読んでソケットへ書き出す
//! - テストでは受信側から通知を直接 assert する
//!
//! 受信側が drop されていれば `DeliveryError::Closed` を返す。

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{DeliveryError, ServerMessage};
use crate::ports::DeliverySink;

pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DeliverySink for ChannelSink {
    async fn deliver(&self, message: &ServerMessage) -> Result<(), DeliveryError> {
        self.tx
            .send(message.clone())
            .map_err(|_| DeliveryError::Closed)
    }
}
