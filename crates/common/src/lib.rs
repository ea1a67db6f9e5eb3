//! Common utilities and types shared across the meeting broker crates.

#![warn(clippy::pedantic)]

/// Module for shared configuration types
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for the provider OAuth token cache
pub mod token_cache;
