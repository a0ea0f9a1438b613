//! BANE: capability mediation and audit.
//!
//! Every sensitive side effect (outbound network calls, file I/O, camera and
//! LiDAR capture) goes through a single [`channel::Channel`]. The channel
//! validates the caller [`context::Context`], asks the [`policy::PolicyEngine`]
//! for a [`decision::Decision`], dispatches allowed requests to the matching
//! adapter, and writes exactly one signed decision record per request.
//!
//! See `DESIGN.md` for the architecture and the decisions behind it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
pub mod audit;
pub mod bundle;
pub mod channel;
pub mod config;
pub mod context;
pub mod decision;
pub mod logging;
pub mod policy;
pub mod resource;
pub mod runtime;
