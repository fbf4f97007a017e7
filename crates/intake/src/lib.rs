//! Intake - durable, turn-based collection of confirmed user details over chat gateways.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod build_info;
pub mod config;
pub mod reaper;
pub mod store;

// ============================================================================
// Server & HTTP
// ============================================================================

pub mod handlers;
pub mod server;

// ============================================================================
// Domain
// ============================================================================

pub mod flow;
pub mod middleware;
pub mod session;
