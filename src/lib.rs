pub mod baseline;
pub mod batch_runner;
pub mod checkpoint;
pub mod config;
pub mod day30;
pub mod db;
pub mod error;
pub mod growth_curve;
pub mod history_window;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod score;
pub mod store;
