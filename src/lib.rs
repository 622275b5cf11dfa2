//! Mundo Tango - backend for the tango social network
//!
//! Profiles, memories, events, groups, friendships, chat, housing,
//! subscriptions and moderation behind a JSON API.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod metrics;
pub mod models;
pub mod services;
pub mod tasks;
