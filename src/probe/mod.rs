//! Probing pipeline
//!
//! Builds the declarative engine configuration for one endpoint, verifies
//! the endpoint through a real spawned engine instance, and schedules
//! probes across a bounded worker pool.

pub mod engine;
pub mod outbound;
pub mod scheduler;

pub use engine::{ProbeEngine, SubprocessProbeEngine};
pub use scheduler::ProbeScheduler;
