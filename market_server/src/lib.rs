pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod webhook_routes;

#[cfg(test)]
mod endpoint_tests;
