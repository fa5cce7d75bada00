//! Persistent storage for the login service.

pub mod user_store;

pub use user_store::{StoredUser, UserStore};
