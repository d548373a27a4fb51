//! livewatch - live content discovery with webhook notifications.
//!
//! This crate polls a live-content catalog per category and notifies
//! subscribers whose filters match newly seen items:
//! - Catalog polling (Twitch Helix) with cached app credentials
//! - Per-item deduplication with expiring markers
//! - Discord webhook delivery with failure tracking and pruning
//! - Daily delivery counters

pub mod catalog;
pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod repository;
pub mod service;
pub mod sink;
pub mod task;
