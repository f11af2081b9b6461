pub mod assign;
pub mod config;
pub mod simulate;
