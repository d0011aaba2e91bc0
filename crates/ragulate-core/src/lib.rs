pub mod compare;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod export;
pub mod feedback_api;
pub mod model;
pub mod providers;
pub mod recipe;
pub mod report;
pub mod sampling;
pub mod scoring;
pub mod storage;
