//! ControlForge - Multi-format compliance framework importer
//!
//! This library ingests compliance frameworks from Excel, JSON, CSV, XML,
//! and ZIP sources, normalizes them into canonical control and evidence
//! frames, validates them, and seeds them into a SQLite database with
//! idempotent natural-key upserts.

pub mod adapters;
pub mod cli;
pub mod ingest;
pub mod seed;
pub mod storage;
pub mod validate;

/// Re-export commonly used types
pub use adapters::{adapter_for, FormatHint, SourceAdapter, ValidationReport};
pub use ingest::{ControlRecord, ControlsFrame, EvidenceFrame, EvidenceRecord, Mappings};
pub use seed::{run_seed, SeedOutcome, SeedRequest};
pub use storage::Database;

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "controlforge";
