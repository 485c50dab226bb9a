pub mod field;
pub mod models;
