pub mod backoff;
pub mod cli;
pub mod daemon;
pub mod errors;
pub mod generation;
pub mod models;
pub mod server;
pub mod storage;
