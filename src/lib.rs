//! # Docshelf
//!
//! A self-hosted document storage and full-text search backend.
//!
//! Docshelf accepts file uploads over HTTP, stores the originals on disk with
//! their metadata in SQLite, extracts text in a background pipeline, and
//! serves typo-tolerant full-text search from an embedded tantivy index.
//! Every document belongs to the user who uploaded it; listing, search, and
//! download are all scoped to the authenticated owner.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────┐
//! │  Upload  │──▶│ SQLite + disk │──▶│  Indexing │
//! │  (HTTP)  │   │  (metadata)   │   │  workers  │
//! └──────────┘   └──────┬────────┘   └─────┬─────┘
//!                       │                  ▼
//!                       │            ┌───────────┐
//!                       └───join────▶│  tantivy  │
//!                        on query    │   index   │
//!                                    └───────────┘
//! ```
//!
//! The metadata store is authoritative; the search index is a rebuildable
//! projection of it (`docshelf reindex` regenerates it from scratch).
//!
//! ## Quick Start
//!
//! ```bash
//! docshelf init                 # create database, index, upload dir
//! docshelf serve                # start the HTTP API
//! docshelf reindex              # rebuild the search index
//! docshelf stats                # print aggregate counts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | SQLite metadata store |
//! | [`extract`] | Per-format text extraction |
//! | [`index`] | tantivy search index adapter |
//! | [`pipeline`] | Background indexing workers |
//! | [`search`] | Query orchestration and hit enrichment |
//! | [`auth`] | Passwords, tokens, and the request extractor |
//! | [`ratelimit`] | Per-IP fixed-window limiting |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod index;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod ratelimit;
pub mod search;
pub mod server;
pub mod store;
