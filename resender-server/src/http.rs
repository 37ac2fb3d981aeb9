//! Request handlers.
pub mod health;
pub mod jobs;
pub mod start;
pub mod stop;
