//! HTTP surface for a [`resender::scheduler::Scheduler`] that sends email.
pub mod app;
pub mod config;
pub mod error;
pub mod http;
