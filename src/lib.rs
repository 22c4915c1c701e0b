pub mod auth;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod http;
pub mod reconcile;
pub mod registry;
pub mod request;
pub mod session;
pub mod stream;
pub mod transcript;
