pub mod app;
pub mod campaign;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod handler;
pub mod llm;
pub mod models;
pub mod session;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
