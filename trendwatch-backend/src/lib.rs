pub mod cli;
pub mod config;
pub mod extract;
pub mod logging;
pub mod refresh;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod web;
