// crates/core/src/lib.rs
//! Asynchronous registry of metafile creation jobs.
//!
//! Clients create tasks, poll their status, fetch the produced metafile and
//! delete them. Jobs run on a bounded worker pool and report back through
//! id-keyed events, so deleting a task never races with its job.
pub mod bencode;
pub mod config;
pub mod creator;
pub mod error;
pub mod id;
pub mod params;
pub mod registry;
pub mod result;
pub mod task;
pub mod worker;

pub use config::RegistryConfig;
pub use creator::TorrentCreator;
pub use error::*;
pub use id::TaskId;
pub use params::TaskParams;
pub use registry::{install, RegistryHandle, TaskRegistry};
pub use result::{content, read_content, Payload, TaskResult};
pub use task::{Task, TaskStatus};
pub use worker::{JobContext, TaskEvent, UnitOfWork};
