//! HTTP handlers for the logistics auth service.

pub mod auth;
pub mod health;
pub mod metrics;
pub mod organization;
pub mod user;
