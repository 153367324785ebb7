//! Pipeline state tracker.
//!
//! Owns the fixed ordered list of migration stages and their statuses. The
//! run controller mutates it through `update_stage`; presentation layers
//! observe it through its change notifier and snapshot accessors.

use crate::model::{ReportNode, Stage, StageStatus, STAGE_LABELS};
use crate::notify::ChangeNotifier;
use crate::tree::TreeSource;
use std::sync::Mutex;

pub struct StageTracker {
    stages: Mutex<Vec<Stage>>,
    notifier: ChangeNotifier,
}

impl StageTracker {
    /// Create the tracker with all stages `pending` and no details.
    pub fn new() -> Self {
        let stages = STAGE_LABELS
            .into_iter()
            .enumerate()
            .map(|(index, label)| Stage {
                index,
                label,
                status: StageStatus::Pending,
                details: None,
            })
            .collect();
        Self {
            stages: Mutex::new(stages),
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Replace the status and details of the stage at `index` and notify
    /// observers. An out-of-range index is a silent no-op with no
    /// notification; long-lived views can hold stale indices and those must
    /// not fault the tracker. No transition legality is checked: the engine's
    /// callbacks are applied verbatim, in arrival order.
    pub fn update_stage(&self, index: usize, status: StageStatus, details: Option<String>) {
        {
            let mut stages = self.stages.lock().unwrap();
            let Some(stage) = stages.get_mut(index) else {
                return;
            };
            stage.status = status;
            stage.details = details;
        }
        self.notifier.fire();
    }

    /// Cloned snapshot of the current stage sequence.
    pub fn stages(&self) -> Vec<Stage> {
        self.stages.lock().unwrap().clone()
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeSource for StageTracker {
    fn children(&self, node: Option<&ReportNode>) -> Vec<ReportNode> {
        if node.is_some() {
            return Vec::new();
        }
        self.stages()
            .iter()
            .map(|stage| {
                let content = match stage.details.as_deref() {
                    Some(details) => format!("{} {}", stage.status.glyph(), details),
                    None => stage.status.glyph().to_string(),
                };
                ReportNode::leaf(stage.label, content)
            })
            .collect()
    }
}
