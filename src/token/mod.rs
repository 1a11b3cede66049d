//! Token acquisition adapters.

pub mod http;

pub use http::HttpTokenClient;
