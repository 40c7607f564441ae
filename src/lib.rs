pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod posts;
pub mod repository;
pub mod rpc;
pub mod state;
pub mod users;
pub mod validation;
