//! The worker fleet: registration client, per-service-type probes, signed
//! heartbeats, and the bus consume/publish loop (§4.2, §4.3, §6).
//!
//! Like `nestwatch_scheduler`, this crate keeps its algorithmic pieces
//! (`probe`, `heartbeat`) broker- and HTTP-client-free where possible so
//! they're directly unit-testable; `nestwatch-worker`'s `main.rs` is the
//! only place that wires the real `lapin` connection and `reqwest` client
//! together into `run::WorkerRuntime`.

pub mod error;
pub mod heartbeat;
pub mod probe;
pub mod registration;
pub mod run;

pub use error::{Result, WorkerError};
pub use registration::RegistrationClient;
pub use run::{run_command_consumer, run_heartbeat_loop, WorkerRuntime};
