// src/models/project.rs

//! Remote-side payload shapes.

use serde::{Deserialize, Serialize};

/// A research project on the analysis server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// What an import operation covers; also selects the server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportType {
    /// Items of the currently active collection
    Collection,
    /// Items marked selected in the page
    Selected,
    /// The whole traversed library
    Library,
    /// Items staged by the in-page export affordance
    Extension,
}

impl ImportType {
    /// History/description label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Collection => "collection items",
            Self::Selected => "selected items",
            Self::Library => "library items",
            Self::Extension => "staged items",
        }
    }
}

/// Which server-side export to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    Results,
    Bibliography,
}

impl ExportType {
    /// History/description label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Results => "validated results",
            Self::Bibliography => "bibliography entries",
        }
    }
}

/// Result of an import call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ImportOutcome {
    #[serde(default)]
    pub imported: usize,
}

/// Result of a connection probe.
///
/// A probe never errors on transport failure; it reports `connected:
/// false` with status 0 instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProbe {
    pub connected: bool,
    pub status: u16,
    pub message: String,
}

impl HealthProbe {
    pub fn ok(status: u16) -> Self {
        Self {
            connected: true,
            status,
            message: "Connection successful".to_string(),
        }
    }

    pub fn failed(status: u16, message: impl Into<String>) -> Self {
        Self {
            connected: false,
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_constructors() {
        assert!(HealthProbe::ok(200).connected);
        let failed = HealthProbe::failed(0, "connection refused");
        assert!(!failed.connected);
        assert_eq!(failed.status, 0);
    }

    #[test]
    fn import_outcome_tolerates_extra_fields() {
        let outcome: ImportOutcome =
            serde_json::from_str(r#"{"imported": 3, "skipped": 1}"#).unwrap();
        assert_eq!(outcome.imported, 3);
    }
}
