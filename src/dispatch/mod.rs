//! Remote worker dispatch.
//!
//! This module requests out-of-process execution of jobs:
//!
//! - **Dispatcher**: resolves a job type to its worker function and the
//!   environment-specific application name
//! - **RemoteInvoker**: the fire-and-forget invocation capability
//! - **HttpInvoker**: gateway-backed implementation

pub mod http;
pub mod spawner;

// Re-export main types for convenience
pub use http::HttpInvoker;
pub use spawner::{DispatchError, Dispatcher, RemoteInvoker};
