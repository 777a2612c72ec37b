//! Single-concurrency scheduler runner.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, and introspection methods
//! - `drain`: submission, the FIFO drain, the per-execution driver, and release
//! - `bridge`: nested invocations joined to the current execution

mod bridge;
mod core;
mod drain;

pub use self::core::Scheduler;
