//! # Upload Scout Core
//!
//! Runtime-free logic for Upload Scout: data models, reverse-proxy route
//! parsing, the service lookup index, build-artifact extraction heuristics,
//! batch delivery to scan listeners, the artifact store abstraction, and
//! the match ranking algorithm.
//!
//! This crate contains no tokio, sqlx, SSH, or HTTP dependencies. The
//! `upload-scout` crate supplies those and drives the pieces defined here.

pub mod batch;
pub mod extract;
pub mod lookup;
pub mod models;
pub mod proxy;
pub mod ranking;
pub mod store;
