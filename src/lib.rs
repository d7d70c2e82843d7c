//! # Post Harvest
//!
//! Resumable bulk harvesting of social-media posts from a PostgREST-style
//! archive, with a content filter, incremental CSV output, and an embedding
//! pass against a local OpenAI-compatible server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐
//! │  REST source │──▶│  Paging  │──▶│  Filter  │──▶│ CSV sink  │
//! │ accounts/    │   │ limit/   │   │ repost/  │   │ fixed     │
//! │ tweets       │   │ offset   │   │ mentions │   │ header    │
//! └──────────────┘   └──────────┘   └──────────┘   └─────┬─────┘
//!                          │                             │
//!                          ▼                             ▼
//!                    ┌────────────┐               ┌────────────┐
//!                    │ Checkpoint │               │   Embed    │
//!                    │   (JSON)   │               │  (HTTP)    │
//!                    └────────────┘               └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest accounts --limit 20          # check credentials and listing
//! harvest collect                      # full run, new checkpoint
//! harvest collect --resume-latest      # pick up an interrupted run
//! harvest stats tweets_data_filtered_20250101_120000.csv
//! harvest embed tweets_data_filtered_20250101_120000.csv --user alice
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Accounts and post rows |
//! | [`traits`] | The [`traits::PostSource`] seam |
//! | [`connector_rest`] | PostgREST implementation of the source |
//! | [`paging`] | Limit/offset page loop |
//! | [`accounts`] | Account enumeration and lookup |
//! | [`filter`] | Low-value post detection |
//! | [`writer`] | Append-only CSV output |
//! | [`checkpoint`] | Resumable progress records |
//! | [`collect`] | The checkpointed collection pipeline |
//! | [`embedding`] | Embedding endpoint client |
//! | [`embed_cmd`] | CSV embedding pass |
//! | [`stats`] | Table inspection |
//! | [`import`] | Survey import |
//! | [`progress`] | Progress reporting |

pub mod accounts;
pub mod checkpoint;
pub mod collect;
pub mod config;
pub mod connector_rest;
pub mod embed_cmd;
pub mod embedding;
pub mod filter;
pub mod import;
pub mod models;
pub mod paging;
pub mod progress;
pub mod stats;
pub mod traits;
pub mod writer;
