//! Clients for the external step runner helper
//!
//! The helper enumerates a runner's steps and executes them. stepcache never
//! interprets what a step does; it only sees step names and the directories
//! the steps leave under the cache root.

mod client;
mod helper;

pub use client::StepRunner;
pub use helper::HelperRunner;
