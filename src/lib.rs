//! KitchenSync — shared kitchen inventory tracking over HTTP.
//!
//! Kitchens are tenant scopes joined by 6-digit codes; users authenticate
//! per kitchen with JWT access/refresh tokens; items carry a percentage
//! quantity with a derived needed/in_stock status; consumption and
//! restock events land in append-only logs.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod inventory;
pub mod kitchen;
pub mod store;
