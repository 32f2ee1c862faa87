//! Executes one job as a pipeline of containers, wired to the event bus
//! for live logs and the store for persistence, driving each phase
//! through `bollard`'s Docker Engine API client.

mod container;
mod error;
mod runner;
mod state;
mod work;

pub use container::ExitOutcome;
pub use error::RunnerError;
pub use runner::Runner;
pub use state::Phase;
pub use work::{Credentials, Work};
