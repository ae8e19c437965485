//! # cadbridge-core
//!
//! Foundation types shared by every cadbridge crate:
//!
//! - **Error codes**: stable wire codes plus [`errors::CommandError`] and [`errors::HostError`]
//! - **Host seams**: [`host::HostDocument`], [`host::ExecutionScope`], [`host::FailureResolver`]
//! - **Requests**: [`request::CommandRequest`] and opt-in [`request::Expectations`]
//! - **Request ids**: [`ids::RequestId`]
//! - **In-memory host**: [`memory_host::MemoryHost`] for the stdio agent and tests
//! - **Logging**: [`logging::init_subscriber`] and log capture for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod host;
pub mod ids;
pub mod logging;
pub mod memory_host;
pub mod request;
