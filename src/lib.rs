//! tabwarden: a focus-enforcement layer for browser tabs
//!
//! Watches open tabs through a stdio bridge to the browser side and
//! enforces a configurable study policy: precedence-ordered allow/block
//! evaluation, temporary domain/URL locks with exact restoration, and an
//! event-driven enforcement loop that closes or redirects violating tabs.

pub mod bridge;
pub mod engine;
pub mod platform_dirs;

pub use engine::prelude::*;
