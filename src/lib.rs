pub mod cli;
pub mod engine;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod text_summary;
pub mod tree;
