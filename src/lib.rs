pub mod app;
pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod scraper;
pub mod service;
pub mod store;
pub mod version;
