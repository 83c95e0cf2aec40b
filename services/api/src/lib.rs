pub mod adapters;
pub mod config;
pub mod error;
pub mod presence;
pub mod web;
