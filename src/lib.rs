//! Core build-orchestration engine: hook-to-build pipeline, queue,
//! runner pool, event bus and log multiplexer. Everything here is
//! runnable without the `server` feature; `gantry-server` just wires
//! it to an HTTP surface.

pub mod config;
pub mod error;
pub mod hook;
pub mod logmux;
pub mod orchestrator;

#[cfg(feature = "server")]
mod wiring;

pub use config::ServerConfig;
pub use error::GantryError;
pub use logmux::LogMultiplexer;
pub use orchestrator::Orchestrator;

#[cfg(feature = "server")]
pub use wiring::HookPipeline;
