pub mod cache;
pub mod statement;
