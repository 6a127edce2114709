pub mod aws;
pub mod browser;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod login;
pub mod prompt;
pub mod secrets;
