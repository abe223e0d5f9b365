//! MySQL-backed row source for the promosync engine.

pub mod repository;

pub use repository::{DatabaseSettings, MySqlRowSource};
