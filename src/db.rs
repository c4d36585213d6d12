pub mod client;
pub mod error;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod test_helpers;
