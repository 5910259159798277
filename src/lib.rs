//! Paper Exchange: simulated crypto trading over live market prices.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod storage;
pub mod market;
pub mod auth;
pub mod engine;
pub mod web;
