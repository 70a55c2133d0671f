//! # Configuration Module
//!
//! This module provides the run configuration and the per-image job derived from it.

pub mod config;

pub use config::{ProcessMode, ScorerKind, TilingConfig, TilingJob};
