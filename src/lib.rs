//! Image update detection for running containers.
//!
//! [`registry`] resolves tags and manifest digests from Registry V2
//! instances, [`classifier`] turns a container's local and remote state into
//! an update verdict, and [`trigger`] decides which notifications fire and
//! renders their text through the restricted [`template`] evaluator.

pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod registry;
pub mod tag;
pub mod template;
pub mod trigger;
pub mod watch;
