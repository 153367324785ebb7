use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Fixed pipeline stage labels, index 0-8. The sequence is created once per
/// migration session and never reordered or resized.
pub const STAGE_LABELS: [&str; 9] = [
    "Project Exploration",
    "POM Analysis",
    "Spring Boot Verification",
    "Initial Compilation",
    "Test Execution",
    "Migration Path Determination",
    "Migration Execution",
    "Post-migration Verification",
    "Report Generation",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl StageStatus {
    /// Presentation glyph for stage listings.
    pub fn glyph(self) -> &'static str {
        match self {
            StageStatus::Pending => "⏳",
            StageStatus::InProgress => "🔄",
            StageStatus::Completed => "✅",
            StageStatus::Error => "❌",
        }
    }
}

/// One named step of the migration pipeline. Only `status` and `details`
/// change after construction, and only by whole replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub index: usize,
    pub label: &'static str,
    pub status: StageStatus,
    pub details: Option<String>,
}

/// Final outcome reported by the migration engine for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub success: bool,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl MigrationResult {
    /// Fold a hard engine fault into an ordinary failed result so it can be
    /// presented like any other engine failure.
    pub fn from_fault(fault: &anyhow::Error) -> Self {
        Self {
            success: false,
            report_path: None,
            message: None,
            error: Some(format!("{fault:#}")),
            reasoning: None,
        }
    }

    /// The one-line failure text to show the user: `message` wins, then `error`.
    pub fn headline(&self) -> &str {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("unknown engine failure")
    }
}

/// One entity in a navigable tree derived from tracker or report state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportNode {
    pub label: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    pub fn leaf(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
            children: Vec::new(),
        }
    }
}

/// One progress callback from the engine: stage index, new status, optional
/// details. Forwarded verbatim to the tracker, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: usize,
    pub status: StageStatus,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub project_path: PathBuf,
    pub run_id: String,
    pub engine_cmd: String,
    pub engine_args: Vec<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}
