//! Capture-to-sync pipeline for field survey photos.
//!
//! Projects own vehicles, vehicles own tracks and tracks own ordered points.
//! Photos are attached to projects, vehicles or track points, stored locally
//! and uploaded in the background by the [`services::SyncEngine`].

pub mod camera;
pub mod config;
pub mod database;
pub mod error;
pub mod filesystem;
pub mod models;
pub mod services;
