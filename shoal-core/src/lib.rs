// ABOUTME: Backend-agnostic relay core: buses, bridges, supervision and attachment storage
// ABOUTME: Chat backends plug in through the ChatBackend trait

pub mod binding;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod notify;
pub mod paths;
pub mod router;
pub mod store;
pub mod supervisor;
pub mod testing;
pub mod traits;

pub use binding::Binding;
pub use bridge::Bridge;
pub use bus::{Direction, LocalBus, MessageBus};
pub use config::Config;
pub use error::{BusError, DeliveryError, StorageError, TaskFailure};
pub use message::{ChannelType, Message, MessageKind};
pub use notify::{LogNotifier, OperatorNotifier};
pub use router::Router;
pub use store::{ContentStore, StoredBlob};
pub use supervisor::{Supervisor, WorkerTask};

// Re-export backend traits for adapter crates
pub use traits::{ChatBackend, EventPayload, EventStream, InboundEvent};
