//! Text summary builder for CLI output.
//!
//! Formats the final pipeline table, report tree, and run outcome as
//! human-readable lines for text mode.

use crate::model::{ReportNode, RunConfig, Stage};
use crate::orchestrator::RunReport;
use crate::tree::TreeSource;
use std::path::Path;

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

/// Walk one report node: label, content lines, then any nested children
/// pulled through the tree source.
fn push_report_node(
    lines: &mut Vec<String>,
    report: &dyn TreeSource,
    node: &ReportNode,
    depth: usize,
) {
    let pad = "  ".repeat(depth);
    lines.push(format!("{pad}{}", node.label));
    for content_line in node.content.lines() {
        lines.push(format!("{pad}  {content_line}"));
    }
    for child in report.children(Some(node)) {
        push_report_node(lines, report, &child, depth + 1);
    }
}

pub fn build_text_summary(
    cfg: &RunConfig,
    run: &RunReport,
    stages: &[Stage],
    report: &dyn TreeSource,
    report_source: Option<&Path>,
) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!(
        "Run {}: {}",
        cfg.run_id,
        cfg.project_path.display()
    ));
    lines.push(format!(
        "Started {}, finished {}",
        run.started_utc, run.finished_utc
    ));

    lines.push(String::new());
    lines.push("Pipeline:".to_string());
    for stage in stages {
        match stage.details.as_deref() {
            Some(details) => lines.push(format!(
                "  {} {}: {}",
                stage.status.glyph(),
                stage.label,
                details
            )),
            None => lines.push(format!("  {} {}", stage.status.glyph(), stage.label)),
        }
    }

    lines.push(String::new());
    let roots = report.children(None);
    if roots.is_empty() {
        lines.push("Report: (empty)".to_string());
    } else {
        lines.push("Report:".to_string());
        for node in &roots {
            push_report_node(&mut lines, report, node, 1);
        }
    }

    lines.push(String::new());
    if run.result.success {
        lines.push("Migration completed successfully!".to_string());
        if let Some(path) = report_source {
            lines.push(format!("Detailed report generated at: {}", path.display()));
        }
    } else {
        lines.push(format!("Migration failed: {}", run.result.headline()));
        if let Some(reasoning) = run.result.reasoning.as_deref() {
            lines.push("Reasoning:".to_string());
            for reasoning_line in reasoning.lines() {
                lines.push(format!("  {}", reasoning_line));
            }
        }
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MigrationResult, StageStatus, STAGE_LABELS};
    use std::path::PathBuf;

    fn config() -> RunConfig {
        RunConfig {
            project_path: PathBuf::from("/work/shop"),
            run_id: "42".into(),
            engine_cmd: "java-migration-engine".into(),
            engine_args: vec![],
            timeout: None,
        }
    }

    fn stages() -> Vec<Stage> {
        STAGE_LABELS
            .into_iter()
            .enumerate()
            .map(|(index, label)| Stage {
                index,
                label,
                status: StageStatus::Pending,
                details: None,
            })
            .collect()
    }

    fn run_report(result: MigrationResult) -> RunReport {
        RunReport {
            started_utc: "2025-03-01T10:00:00Z".into(),
            finished_utc: "2025-03-01T10:05:00Z".into(),
            result,
        }
    }

    /// Fixed tree source standing in for the report ingestor.
    struct FixedTree(Vec<ReportNode>);

    impl TreeSource for FixedTree {
        fn children(&self, node: Option<&ReportNode>) -> Vec<ReportNode> {
            match node {
                None => self.0.clone(),
                Some(node) => node.children.clone(),
            }
        }
    }

    #[test]
    fn successful_summary_names_the_report_path() {
        let run = run_report(MigrationResult {
            success: true,
            report_path: Some(PathBuf::from("/tmp/report.json")),
            message: None,
            error: None,
            reasoning: None,
        });
        let tree = FixedTree(vec![ReportNode::leaf("Project", "/work/shop")]);
        let summary = build_text_summary(
            &config(),
            &run,
            &stages(),
            &tree,
            Some(Path::new("/tmp/report.json")),
        );

        let text = summary.lines.join("\n");
        assert!(text.contains("Migration completed successfully!"));
        assert!(text.contains("Detailed report generated at: /tmp/report.json"));
        assert!(text.contains("  Project\n    /work/shop"));
    }

    #[test]
    fn failed_summary_shows_error_and_reasoning() {
        let run = run_report(MigrationResult {
            success: false,
            report_path: None,
            message: None,
            error: Some("compile failed".into()),
            reasoning: Some("javac 21 rejects\nthe old source level".into()),
        });
        let summary = build_text_summary(&config(), &run, &stages(), &FixedTree(vec![]), None);

        let text = summary.lines.join("\n");
        assert!(text.contains("Migration failed: compile failed"));
        assert!(text.contains("Reasoning:\n  javac 21 rejects\n  the old source level"));
        assert!(text.contains("Report: (empty)"));
    }
}
