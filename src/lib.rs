//! dlckit - DLC download and installation engine.
//!
//! Fetches single- or multi-part archive releases over HTTP, validates and
//! extracts them into a game directory, and classifies on-disk install state
//! against the catalog.

pub mod archive;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod installer;
pub mod reconcile;
