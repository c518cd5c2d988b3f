#![doc = "The `todone` library crate."]
#![doc = ""]
#![doc = "Turns forwarded emails into todos: the webhook stores each inbound email and"]
#![doc = "queues it, a background worker classifies it with a language model and appends"]
#![doc = "the resulting todo to its owner's ordered list. The crate also carries the"]
#![doc = "account, todo and email HTTP API used by the web client."]

pub mod auth;
pub mod blob;
pub mod classifier;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod ordering;
pub mod routes;
pub mod state;
pub mod store;

pub use error::AppError;
pub use state::AppState;
