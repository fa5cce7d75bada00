//! HTTP layer: route table, request/response models, and handlers.

pub mod handlers;
pub mod models;
pub mod server;
