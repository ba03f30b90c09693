pub mod cli;
pub mod config;
pub mod deps;
pub mod dlrn;
pub mod errors;
pub mod fetch;
pub mod report;
pub mod rpm;
