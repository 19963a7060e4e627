pub mod config;
pub mod error;
pub mod processor;
pub mod scheduler;
pub mod upload;
pub mod worker;
