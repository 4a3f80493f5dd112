//! # relsearch
//!
//! Upload a ZIP of XML documents, browse its layout, and query the
//! `EntityRelationship` elements inside it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐
//! │ archive  │──▶│   tree   │                 upload stage
//! └──────────┘   └──────────┘
//!
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  locate  │──▶│ document │──▶│  filter  │──▶│ project  │   query stage
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!                        ╲__________ search __________╱
//!
//!                ┌──────────┐       ┌──────────┐
//!                │   CLI    │       │   HTTP   │
//!                │(relsearch│       │ (server) │
//!                └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! relsearch extract solution.zip --dest ./out
//! relsearch search --extract-path ./out --folder . --starting mmpl_ --not-ending Id
//! relsearch serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Request-level error type |
//! | [`archive`] | Safe ZIP extraction |
//! | [`tree`] | Directory structure reporting |
//! | [`locate`] | Document discovery |
//! | [`document`] | XML parsing and relationship extraction |
//! | [`filter`] | Keyword, prefix, and suffix predicates |
//! | [`project`] | Field resolution and result records |
//! | [`search`] | The query pipeline |
//! | [`server`] | HTTP server |

pub mod archive;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod locate;
pub mod project;
pub mod search;
pub mod server;
pub mod tree;

pub use error::EngineError;
