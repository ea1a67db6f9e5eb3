//! Meeting Broker Service Library
//!
//! Places meetings on a pool of provider accounts ("hosts") that each allow
//! only a few simultaneous meetings. Callers ask for a time window; the broker
//! picks the first host in priority order with spare capacity and creates
//! the meeting there, or reports every host's conflicts when none has room.
//!
//! Also serves read-only cross-host reports and workspace reservation
//! pass-throughs.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> provider REST API
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `hosts` - Priority ordered host list
//! - `middleware` - HTTP metrics middleware
//! - `models` - Request, response and provider models
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - Provider client, allocation, reports, workspaces
//! - `time` - Local time and window arithmetic

pub mod config;
pub mod errors;
pub mod handlers;
pub mod hosts;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
pub mod time;
