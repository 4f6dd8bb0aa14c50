//! Shared paste model and wire types.

pub mod api;
pub mod models;
