//! Event handling: from an inbound event to commits, pull requests, and comments.
//!
//! The model-output pipeline is [`extract`] → [`schema`] → typed values, with
//! [`workflow`] degrading malformed output to empty results. [`apply`] commits
//! change-sets, [`dispatch`] picks a workflow, [`format`] renders reviews, and
//! [`workflow`] wires them to the [`llm`] and repository collaborators.

pub mod apply;
pub mod dispatch;
pub mod extract;
pub mod format;
pub mod llm;
pub mod prompt;
pub mod schema;
pub mod telemetry;
pub mod workflow;
