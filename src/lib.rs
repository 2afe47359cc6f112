//! profiled — asynchronous program-profiling task service.
//!
//! Accepts source uploads over REST, queues durable profiling jobs, and runs
//! them through composable profiler strategies (classical instrumentation,
//! LLM static analysis, or both layered).

pub mod config;
pub mod error;
pub mod files;
pub mod http;
pub mod profiler;
pub mod scheduler;
pub mod store;
pub mod submit;
pub mod task;
