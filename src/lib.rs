//! # Course Harness
//!
//! An in-memory course catalog with keyword search, prefix filtering,
//! sorting, pagination, and content negotiation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐
//! │ course-data │──▶│ CourseStore │──┐
//! │   (JSON)    │   └─────────────┘  │   ┌─────────────┐   ┌──────────┐
//! └─────────────┘   ┌─────────────┐  ├──▶│ QueryEngine │──▶│  format  │
//!                   │ TokenIndex  │──┘   └──────▲──────┘   └────┬─────┘
//!                   └─────────────┘             │               │
//!                                        ┌──────┴──────┐        ▼
//!                                        │   params    │   CLI / HTTP
//!                                        └─────────────┘
//! ```
//!
//! The store and index are built once at startup and never mutated. Each
//! query normalizes its parameters, folds them over the dataset in a fixed
//! priority order, and hands the resulting shape to the renderer.
//!
//! ## Quick Start
//!
//! ```bash
//! courses query subject=COP keywords=programming
//! courses serve
//! curl 'http://127.0.0.1:8000/courses?subject=CHM&isLab&format=yaml'
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Course records and response bodies |
//! | [`store`] | Dataset loading |
//! | [`index`] | Stem and phonetic token index |
//! | [`params`] | Parameter vocabulary, validation, and merging |
//! | [`query`] | Query evaluation |
//! | [`format`] | Representation negotiation and rendering |
//! | [`status`] | Uptime and request counter |
//! | [`error`] | Validation and internal errors |
//! | [`server`] | HTTP server |

pub mod config;
pub mod error;
pub mod format;
pub mod index;
pub mod models;
pub mod params;
pub mod query;
pub mod server;
pub mod status;
pub mod store;
