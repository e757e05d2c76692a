//! Portfolio Edge - request handlers behind a personal portfolio site.
//!
//! # Overview
//!
//! Four independent handlers, each a linear request/response function:
//!
//! - **GeoProbe**: caller IP plus geolocation from a free geo-IP API
//! - **TelemetryProbe**: GeoProbe plus a best-effort access log write
//! - **AlertDispatcher**: formats an SOS message and broadcasts it to a topic
//! - **BiometricCompare**: face similarity score, with a bilingual AI
//!   description when the score clears a cost gate
//!
//! Enrichment never blocks the primary response. A failed geolocation lookup,
//! log write or AI description is logged and replaced with sentinel values;
//! only malformed input, missing configuration or a failed core call turns
//! into a 500, and that 500 never carries internal error text.
//!
//! # Modules
//!
//! - [`model`]: Event, response envelope and per-handler payloads
//! - [`handlers`]: The four handlers
//! - [`services`]: Third-party service traits and HTTP clients
//! - [`storage`]: SQLite record store
//! - [`gateway`]: axum front door
//! - [`config`]: Environment configuration
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod model;
pub mod services;
pub mod storage;
