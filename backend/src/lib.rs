pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod feeds;
pub mod pollers;
pub mod repository_sqlx;
pub mod sinks;
