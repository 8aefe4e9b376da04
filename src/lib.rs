//! Multi-merchant mobile-money payment gateway.
//!
//! Merchants register processor credentials; the gateway signs and sends
//! preorder and query requests on their behalf, hands out checkout URLs and
//! reconciles order state from query responses and processor notifications.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;

#[cfg(test)]
mod testing;
