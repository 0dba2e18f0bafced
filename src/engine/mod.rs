//! # Engine Module
//!
//! Internal registry implementation.
//!
//! This module contains the registry building blocks:
//! - Identifiers and keys
//! - The tile and world collaborator traits
//! - Synchronized indices and container pools
//! - Deferred work queues and the tick drains
//! - Change, vocabulary and rescan notification
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod tile;
pub mod world;
pub mod pool;
pub mod index;
pub mod commands;
pub mod scheduler;
pub mod notify;
pub mod query;
pub mod config;
pub mod manager;
