pub mod auth_cmd;
pub mod common;
pub mod config;
pub mod delete;
pub mod history;
pub mod sync;
