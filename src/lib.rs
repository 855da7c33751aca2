//! Parcel back-office: shipping slip lifecycle, parcel scanning and
//! expedition reception over an axum + sqlx API, plus a typed client.

pub mod auth;
pub mod client;
pub mod config;
pub mod database;
pub mod domain;
pub mod dtos;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

pub use routes::app;
