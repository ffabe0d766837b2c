pub mod auth;
pub mod config;
pub mod health;
pub mod permission;
pub mod role;
pub mod user;
