//! Domain model (ids, status, records, payloads, messages, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod request;
pub mod state;
pub mod task;

pub use self::errors::{
    DeliveryError, PredictError, ProtocolError, SubmitError, TransitionError, ValidationError,
};
pub use self::events::{ClientRequest, ServerMessage};
pub use self::ids::{ConnectionId, IdParseError, TaskId};
pub use self::outcome::{EventInsights, InferResult, Prediction, PriorityLevel};
pub use self::request::{EventData, InferRequest};
pub use self::state::TaskStatus;
pub use self::task::{StatusUpdate, TaskRecord};
