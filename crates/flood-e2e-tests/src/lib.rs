//! End-to-end integration tests for floodwatch.
//!
//! These tests drive the whole engine against in-memory collaborators:
//! - The reference scenarios (first alert, dedup, cooldown, breaker, retries)
//! - Decision, idempotence and ordering properties
//! - Service lifecycle and graceful shutdown

#![cfg(test)]
