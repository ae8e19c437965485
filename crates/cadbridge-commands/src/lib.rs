//! # cadbridge-commands
//!
//! Everything about *which* command a request names and *what* its
//! parameters mean, before any host state is touched:
//!
//! - [`naming`]: canonical `domain.leaf` names from legacy dispatch names
//! - [`meta`]: command metadata and inference of kind, importance, risk, category
//! - [`registry`]: the case-insensitive name/alias table built at startup
//! - [`normalize`]: pure, idempotent cleanup of loosely-typed parameters

#![deny(unsafe_code)]

pub mod handler;
pub mod meta;
pub mod naming;
pub mod normalize;
pub mod registry;

pub use handler::DomainCommandHandler;
pub use meta::{CommandAttributes, CommandKind, CommandMeta, Importance, Risk};
pub use normalize::{IssueKind, NormalizeIssue, Normalized, normalize};
pub use registry::{CommandRegistry, RegisteredCommand};
