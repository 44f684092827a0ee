//! CLI command implementations

pub mod cache;
pub mod config;
pub mod run;
pub mod steps;

pub use cache::execute as cache;
pub use config::execute as config;
pub use run::execute as run;
pub use steps::execute as steps;
