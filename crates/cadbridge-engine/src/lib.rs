//! # cadbridge-engine
//!
//! Turns one call into one [`ResultEnvelope`]:
//!
//! - [`dispatcher`]: resolve, normalize, guard, invoke, wrap
//! - [`envelope`]: the uniform result shape and its normalization
//! - [`builtins`]: discovery and ping commands answered without a handler
//! - [`executor`]: the dedicated thread that owns the host, fed by a queue

#![deny(unsafe_code)]

pub mod builtins;
pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod executor;

pub use dispatcher::{Dispatcher, ExecuteCall};
pub use envelope::{EnvelopeContext, ResultEnvelope, Timings};
pub use errors::EngineError;
pub use executor::{EngineHandle, spawn};
