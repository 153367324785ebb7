//! Run lifecycle controller.
//!
//! Invokes the engine, serializes concurrent runs, and propagates results
//! into the stage tracker and the report ingestor. The controller never
//! computes per-stage status itself; it is a conduit for the engine's
//! progress callbacks.

use crate::engine::{CancelFlag, MigrationEngine};
use crate::model::MigrationResult;
use crate::pipeline::StageTracker;
use crate::report::ReportIngestor;
use anyhow::anyhow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Outcome of one `run` call.
#[derive(Debug)]
pub enum RunOutcome {
    Finished(RunReport),
    /// A run was already in progress; nothing was started or queued.
    AlreadyRunning,
}

/// One resolved run: the engine's result plus run bookkeeping.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_utc: String,
    pub finished_utc: String,
    pub result: MigrationResult,
}

pub struct MigrationController<E> {
    engine: E,
    tracker: Arc<StageTracker>,
    ingestor: Arc<ReportIngestor>,
    timeout: Option<Duration>,
    running: AtomicBool,
    cancel: Mutex<Option<CancelFlag>>,
}

impl<E: MigrationEngine> MigrationController<E> {
    pub fn new(
        engine: E,
        tracker: Arc<StageTracker>,
        ingestor: Arc<ReportIngestor>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            tracker,
            ingestor,
            timeout,
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation of the in-flight run, if any.
    pub fn cancel(&self) {
        if let Some(flag) = self.cancel.lock().unwrap().as_ref() {
            flag.request();
        }
    }

    /// Drive one migration run over `project`.
    ///
    /// The caller has already validated the project (directory with a build
    /// descriptor); it is not re-checked here. A second call while a run is
    /// in flight is rejected immediately, never queued. Hard engine faults
    /// are folded into a failed result at this boundary and do not propagate.
    pub async fn run(&self, project: &Path) -> RunOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            return RunOutcome::AlreadyRunning;
        }
        let started_utc = now_rfc3339();

        let flag = CancelFlag::new();
        *self.cancel.lock().unwrap() = Some(flag.clone());

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<crate::model::ProgressUpdate>();
        let tracker = Arc::clone(&self.tracker);
        let forward = tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                tracker.update_stage(update.stage, update.status, update.details);
            }
        });

        let engine_call = self.engine.run(project, progress_tx, flag.clone());
        let engine_res = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, engine_call).await {
                Ok(res) => res,
                Err(_) => {
                    flag.request();
                    Err(anyhow!(
                        "migration engine timed out after {}",
                        humantime::format_duration(limit)
                    ))
                }
            },
            None => engine_call.await,
        };

        // The progress sender is gone once the engine call resolves, so the
        // forwarder drains the remaining callbacks in order and exits.
        let _ = forward.await;

        let result = match engine_res {
            Ok(result) => result,
            Err(fault) => MigrationResult::from_fault(&fault),
        };

        if result.success {
            if let Some(path) = result.report_path.as_ref() {
                let _ = self.ingestor.set_source(path.clone()).await;
            }
        }

        *self.cancel.lock().unwrap() = None;
        self.running.store(false, Ordering::SeqCst);
        RunOutcome::Finished(RunReport {
            started_utc,
            finished_utc: now_rfc3339(),
            result,
        })
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProgressSender;
    use crate::model::{ProgressUpdate, StageStatus};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;

    fn harness() -> (Arc<StageTracker>, Arc<ReportIngestor>) {
        (
            Arc::new(StageTracker::new()),
            Arc::new(ReportIngestor::new(None)),
        )
    }

    fn report(outcome: RunOutcome) -> RunReport {
        match outcome {
            RunOutcome::Finished(report) => report,
            RunOutcome::AlreadyRunning => panic!("run was rejected"),
        }
    }

    /// Engine that replays scripted progress updates, then resolves.
    struct ScriptedEngine {
        updates: Vec<ProgressUpdate>,
        result: Result<MigrationResult, String>,
    }

    #[async_trait]
    impl MigrationEngine for ScriptedEngine {
        async fn run(
            &self,
            _project: &Path,
            progress: ProgressSender,
            _cancel: CancelFlag,
        ) -> Result<MigrationResult> {
            for update in &self.updates {
                let _ = progress.send(update.clone());
            }
            match &self.result {
                Ok(result) => Ok(result.clone()),
                Err(text) => bail!("{text}"),
            }
        }
    }

    fn success_result(report_path: Option<std::path::PathBuf>) -> MigrationResult {
        MigrationResult {
            success: true,
            report_path,
            message: Some("Migration completed successfully".into()),
            error: None,
            reasoning: None,
        }
    }

    #[tokio::test]
    async fn forwards_progress_updates_in_order() {
        let (tracker, ingestor) = harness();
        let engine = ScriptedEngine {
            updates: vec![
                ProgressUpdate {
                    stage: 0,
                    status: StageStatus::InProgress,
                    details: None,
                },
                ProgressUpdate {
                    stage: 0,
                    status: StageStatus::Completed,
                    details: Some("12 files".into()),
                },
                ProgressUpdate {
                    stage: 1,
                    status: StageStatus::InProgress,
                    details: None,
                },
            ],
            result: Ok(success_result(None)),
        };
        let controller = MigrationController::new(engine, tracker.clone(), ingestor, None);

        let run = report(controller.run(Path::new("/p")).await);
        assert!(run.result.success);

        let stages = tracker.stages();
        assert_eq!(stages[0].status, StageStatus::Completed);
        assert_eq!(stages[0].details.as_deref(), Some("12 files"));
        assert_eq!(stages[1].status, StageStatus::InProgress);
        assert_eq!(stages[2].status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn successful_run_ingests_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migration_report.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"version":1,"blocks":[
                {{"kind":"paragraph","text":"Project: /work/shop"}},
                {{"kind":"step","heading":"Compile","details":["ok"]}}]}}"#
        )
        .unwrap();

        let (tracker, ingestor) = harness();
        let engine = ScriptedEngine {
            updates: vec![],
            result: Ok(success_result(Some(path.clone()))),
        };
        let controller =
            MigrationController::new(engine, tracker.clone(), ingestor.clone(), None);

        report(controller.run(Path::new("/work/shop")).await);

        let tree = ingestor.tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].label, "Project");
        assert_eq!(tree[1].label, "Compile");
        // Ingestion does not touch the tracker.
        assert!(tracker
            .stages()
            .iter()
            .all(|s| s.status == StageStatus::Pending));
    }

    #[tokio::test]
    async fn failed_run_skips_ingestion_and_keeps_in_flight_stages() {
        let (tracker, ingestor) = harness();
        let engine = ScriptedEngine {
            updates: vec![ProgressUpdate {
                stage: 3,
                status: StageStatus::InProgress,
                details: None,
            }],
            result: Ok(MigrationResult {
                success: false,
                report_path: None,
                message: None,
                error: Some("compile failed".into()),
                reasoning: None,
            }),
        };
        let controller =
            MigrationController::new(engine, tracker.clone(), ingestor.clone(), None);

        let run = report(controller.run(Path::new("/p")).await);
        assert_eq!(run.result.headline(), "compile failed");
        assert!(ingestor.tree().is_empty());
        assert!(ingestor.source().is_none());
        // Deliberate pass-through: the stage stays in_progress, not error.
        assert_eq!(tracker.stages()[3].status, StageStatus::InProgress);
    }

    #[tokio::test]
    async fn engine_fault_becomes_a_failed_result() {
        let (tracker, ingestor) = harness();
        let engine = ScriptedEngine {
            updates: vec![],
            result: Err("engine crashed".into()),
        };
        let controller = MigrationController::new(engine, tracker, ingestor, None);

        let run = report(controller.run(Path::new("/p")).await);
        assert!(!run.result.success);
        assert!(run.result.error.as_deref().unwrap().contains("engine crashed"));
        assert!(!controller.is_running());
    }

    /// Engine that blocks until released, to exercise the run guard.
    struct GatedEngine {
        release: tokio::sync::Semaphore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MigrationEngine for GatedEngine {
        async fn run(
            &self,
            _project: &Path,
            _progress: ProgressSender,
            _cancel: CancelFlag,
        ) -> Result<MigrationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.release.acquire().await?;
            Ok(success_result(None))
        }
    }

    #[tokio::test]
    async fn second_concurrent_run_is_rejected() {
        let (tracker, ingestor) = harness();
        let controller = Arc::new(MigrationController::new(
            GatedEngine {
                release: tokio::sync::Semaphore::new(0),
                calls: AtomicUsize::new(0),
            },
            tracker,
            ingestor,
            None,
        ));

        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run(Path::new("/p")).await }
        });
        // Wait until the first run holds the guard.
        while !controller.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = controller.run(Path::new("/p")).await;
        assert!(matches!(second, RunOutcome::AlreadyRunning));
        assert_eq!(controller.engine.calls.load(Ordering::SeqCst), 1);

        controller.engine.release.add_permits(1);
        report(first.await.unwrap());
        assert!(!controller.is_running());
    }

    /// Engine that sleeps until cancelled, recording what it saw.
    struct SleepyEngine;

    #[async_trait]
    impl MigrationEngine for SleepyEngine {
        async fn run(
            &self,
            _project: &Path,
            _progress: ProgressSender,
            cancel: CancelFlag,
        ) -> Result<MigrationResult> {
            for _ in 0..200 {
                if cancel.is_requested() {
                    bail!("cancelled");
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(success_result(None))
        }
    }

    #[tokio::test]
    async fn cancel_is_relayed_to_the_engine() {
        let (tracker, ingestor) = harness();
        let controller = Arc::new(MigrationController::new(SleepyEngine, tracker, ingestor, None));

        let run = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run(Path::new("/p")).await }
        });
        while !controller.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        controller.cancel();

        let run = report(run.await.unwrap());
        assert!(!run.result.success);
        assert!(run.result.error.as_deref().unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn timeout_at_the_engine_boundary_fails_the_run() {
        let (tracker, ingestor) = harness();
        let controller = MigrationController::new(
            SleepyEngine,
            tracker,
            ingestor,
            Some(Duration::from_millis(20)),
        );

        let run = report(controller.run(Path::new("/p")).await);
        assert!(!run.result.success);
        assert!(run.result.error.as_deref().unwrap().contains("timed out"));
        assert!(!controller.is_running());
    }
}
