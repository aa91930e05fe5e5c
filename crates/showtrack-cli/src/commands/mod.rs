pub mod auth;
pub mod clear;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod episodes;
pub mod lists;
pub mod prompts;
pub mod show;
pub mod ui;
pub mod watch;
