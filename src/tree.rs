use crate::model::ReportNode;

/// Generic observable tree shape consumed by presentation layers.
///
/// Both the stage tracker and the report ingestor expose their state through
/// this interface so a renderer can walk either without knowing which one it
/// is holding. Pass `None` for the root level.
pub trait TreeSource {
    fn children(&self, node: Option<&ReportNode>) -> Vec<ReportNode>;
}
