//! In-process IPC bridge between the client surface and the backend.
//!
//! Two seams live here: named publish/subscribe channels used for progress and
//! interrupt signalling, and the request/response invocation of backend
//! procedures.

pub mod channel;
pub mod invoke;

pub use channel::{
    publish_serialized, validate_channel_name, ChannelError, EventChannel, LocalEventBus,
    Subscription, SubscriptionId,
};
pub use invoke::{params_from, Backend, InvokeParams};
