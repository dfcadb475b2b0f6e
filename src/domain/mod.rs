pub mod attributes;
pub mod error;
pub mod mirror;
pub mod models;
pub mod settings;
