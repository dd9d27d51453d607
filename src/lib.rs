pub mod app;
pub mod config;
pub mod error;
pub mod library;
pub mod models;
pub mod region;
pub mod session;
pub mod stats;
pub mod store;
pub mod tmdb;
pub mod tracker;
