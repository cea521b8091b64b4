//! Feature Factory: a batch execution service for feature objectives.
//!
//! A batch is an ordered list of features sharing a step budget. The
//! [`coordinator`] runs each feature through the [`runner`] in order, the
//! [`state_machine`] derives batch status, the [`store`] keeps batches, and
//! [`api`] exposes them over HTTP.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod runner;
pub mod state_machine;
pub mod store;
pub mod ui;
pub mod wire;
