pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod geo;
pub mod models;
pub mod observability;
pub mod ports;
pub mod state;
pub mod store;
pub mod zones;

#[cfg(test)]
pub(crate) mod test_support;
