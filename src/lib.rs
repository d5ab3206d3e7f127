//! # Upload Scout
//!
//! Discovers which build script on a remote build host produces a given
//! container image, and which external paths route to a cluster service.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Jump host  │──▶│  Indexer    │──▶│  Extractor   │──▶│  SQLite  │
//! │ (SSH)      │   │ find+group  │   │ cat+heuristic│   │ artifacts│
//! └────────────┘   └─────────────┘   └──────────────┘   └────┬─────┘
//!                                                            │
//!                                  ┌─────────────────────────┘
//!                                  ▼
//!                            ┌──────────┐      ┌──────────────┐
//!                            │  match   │      │ proxy routes │
//!                            │  (rank)  │      │ lookup index │
//!                            └──────────┘      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! uscout init                                   # create database
//! uscout scan                                   # index the jump host
//! uscout match harbor.local/shop/orders:v2 --namespace corp-shop-prod
//! uscout routes --service orders --namespace shop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Remote and scan error types |
//! | [`remote`] | SSH command execution |
//! | [`indexer`] | Remote listing and grouping |
//! | [`extractor`] | Per-directory artifact extraction |
//! | [`scan`] | Scan orchestration, cancellation, single-scan guard |
//! | [`progress`] | Terminal scan listeners |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite artifact store |
//! | [`routes`] | Reverse-proxy route collection |
//! | [`matching`] | `match` command output |

pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod logging;
pub mod matching;
pub mod migrate;
pub mod progress;
pub mod remote;
pub mod routes;
pub mod scan;
pub mod sqlite_store;
