#![forbid(unsafe_code)]

pub mod chart;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod logging;
pub mod models;
pub mod session;
pub mod sqlite;
pub mod sync;
pub mod utils;

pub use cli::app::{Cli, Command};
pub use error::{StreamError, StreamResult};
