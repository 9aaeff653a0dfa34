pub mod analyzer;
pub mod backend;
pub mod candidate;
pub mod config;
pub mod criteria;
pub mod error;
pub mod evaluator;
pub mod gateway;
pub mod mock;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod researcher;
pub mod search;

pub use config::ScoutConfig;
pub use error::{BackendError, PipelineError, Result, ScoutError, SearchError};
pub use pipeline::{PipelineOrchestrator, Stage};
pub use report::Report;
