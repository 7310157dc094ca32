pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod orchestrator;
pub mod replicate;
pub mod routes;
pub mod state;
