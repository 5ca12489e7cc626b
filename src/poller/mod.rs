mod engine;
mod scheduler;

pub use engine::{HostStats, PollEngine, PollError};
pub use scheduler::Scheduler;
