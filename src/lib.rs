// Library exports for StudyHall
// Integration tests drive the router through these modules.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod media;
pub mod routes;
pub mod state;
pub mod thread;
