// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use error::Error;
pub use models::*;
pub use strategy::{run_pipeline_once, PipelineOutput, Strategy};

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
