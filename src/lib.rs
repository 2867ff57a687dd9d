pub mod api;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod requests;
pub mod state;
pub mod task;
pub mod tools;
pub mod utils;
