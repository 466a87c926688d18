pub mod config;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod services;
