// ABOUTME: Root library module exposing backend adapters and process wiring
// ABOUTME: Re-exports the platform-agnostic relay core from shoal-core

pub mod gateway;
pub mod relay;

// Re-export platform-agnostic modules from shoal-core
pub use shoal_core::binding;
pub use shoal_core::bridge;
pub use shoal_core::bus;
pub use shoal_core::config;
pub use shoal_core::error;
pub use shoal_core::message;
pub use shoal_core::notify;
pub use shoal_core::paths;
pub use shoal_core::store;
pub use shoal_core::supervisor;
