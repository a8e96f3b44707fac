//! Ports - 抽象化レイヤー
//!
//! 外部の協力者（推論エンジン、transport、時計、ID 生成）への
//! インターフェースを trait として定義し、実装の詳細を隠蔽します。

pub mod clock;
pub mod delivery_sink;
pub mod id_generator;
pub mod predictor;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery_sink::DeliverySink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::predictor::Predictor;
