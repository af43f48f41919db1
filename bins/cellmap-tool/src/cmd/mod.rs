pub mod demo;
pub mod error;
pub mod keys;
