// src/lib.rs

//! AnalyLit Library Connector
//!
//! Synchronizes bibliographic records between a reference-management web
//! library and the AnalyLit analysis API. The page extractor scrapes the
//! library site's rendered UI into canonical records, the background
//! coordinator owns configuration and sync history and performs the
//! network calls, and the sync controller drives user-triggered
//! import/export operations.

pub mod controller;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod host;
pub mod models;
pub mod notify;
pub mod remote;
pub mod store;
