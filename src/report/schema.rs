//! Versioned report-document schema.
//!
//! The explicit wire contract between the migration engine and the ingestor.
//! The engine writes one JSON document per run; the ingestor rejects versions
//! it does not understand instead of guessing at markup shapes.

use serde::{Deserialize, Serialize};

/// Schema version this build understands.
pub const REPORT_VERSION: u32 = 1;

/// Literal prefix marking the project paragraph.
pub const PROJECT_MARKER: &str = "Project:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDocument {
    pub version: u32,
    #[serde(default)]
    pub blocks: Vec<ReportBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportBlock {
    /// Free paragraph. At most one per document starts with `Project:`.
    Paragraph { text: String },
    /// One migration step, with an optional heading and its detail lines.
    Step {
        #[serde(default)]
        heading: Option<String>,
        #[serde(default)]
        details: Vec<String>,
    },
}
