pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod seed;
pub mod service;
