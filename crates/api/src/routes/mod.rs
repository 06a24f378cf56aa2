//! HTTP handlers, one module per resource.

pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod seller;
