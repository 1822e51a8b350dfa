//! Game image storage
//!
//! Deduplicated, reference-counted image storage bound to the lifecycle of
//! the games that reference it, plus the public endpoint serving the images
//! to chat embeds and web pages.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod server;
pub mod services;
pub mod storage;
