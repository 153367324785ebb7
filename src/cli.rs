use crate::engine::CommandEngine;
use crate::model::RunConfig;
use crate::orchestrator::{MigrationController, RunOutcome};
use crate::pipeline::StageTracker;
use crate::report::ReportIngestor;
use anyhow::{bail, Result};
use clap::Parser;
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Output line routing for the writer task.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn the single writer task that owns stdout/stderr. Regular output
/// arrives as `OutputLine`; warning text from the ingestor and the engine
/// arrives on its own channel and is routed to stderr here, interleaved as
/// it comes in. The task exits once both channels close.
fn spawn_output_writer(
    mut warn_rx: mpsc::UnboundedReceiver<String>,
) -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::spawn(async move {
        let mut out = tokio::io::stdout();
        let mut err = tokio::io::stderr();
        let mut lines_open = true;
        let mut warnings_open = true;
        while lines_open || warnings_open {
            let (msg, to_stderr) = tokio::select! {
                line = rx.recv(), if lines_open => match line {
                    Some(OutputLine::Stdout(msg)) => (msg, false),
                    Some(OutputLine::Stderr(msg)) => (msg, true),
                    None => {
                        lines_open = false;
                        continue;
                    }
                },
                warning = warn_rx.recv(), if warnings_open => match warning {
                    Some(msg) => (msg, true),
                    None => {
                        warnings_open = false;
                        continue;
                    }
                },
            };
            if to_stderr {
                let _ = err.write_all(msg.as_bytes()).await;
                let _ = err.write_all(b"\n").await;
            } else {
                let _ = out.write_all(msg.as_bytes()).await;
                let _ = out.write_all(b"\n").await;
            }
        }
        let _ = out.flush().await;
        let _ = err.flush().await;
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "java-migration-cli",
    version,
    about = "Drive a Java/Maven migration engine and follow its pipeline"
)]
pub struct Cli {
    /// Path to the Maven project to migrate (the workspace root)
    #[arg(default_value = ".")]
    pub project: PathBuf,

    /// Migration engine command to invoke
    #[arg(long, default_value = "java-migration-engine")]
    pub engine: String,

    /// Extra argument passed to the engine before the project path (repeatable)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Abort the engine invocation after this long (e.g. 30m)
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Print the final result and report tree as JSON (no progress lines)
    #[arg(long)]
    pub json: bool,

    /// Suppress per-stage progress lines; keep the final summary
    #[arg(long)]
    pub quiet: bool,
}

/// Generate a random numeric id for this run.
fn gen_run_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    u64::from_le_bytes(b).to_string()
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        project_path: args.project.clone(),
        run_id: gen_run_id(),
        engine_cmd: args.engine.clone(),
        engine_args: args.engine_args.clone(),
        timeout: args.timeout.map(Duration::from),
    }
}

/// Preconditions for starting a migration: the workspace root must be a
/// directory and carry a `pom.xml` at its top level. Violations surface
/// immediately; no pipeline run is started.
fn check_preconditions(project: &Path) -> Result<()> {
    if !project.is_dir() {
        bail!(
            "{} is not a directory; open a Maven project folder first",
            project.display()
        );
    }
    if !project.join("pom.xml").is_file() {
        bail!(
            "no pom.xml found in {}; open a Maven project",
            project.display()
        );
    }
    Ok(())
}

/// Run one migration end to end and return the process exit code.
pub async fn run(args: Cli) -> Result<i32> {
    check_preconditions(&args.project)?;
    let cfg = build_config(&args);

    // Warning channel: ingestion warnings and engine chatter land on stderr
    // through the writer task.
    let (warn_tx, warn_rx) = mpsc::unbounded_channel::<String>();
    let (out_tx, out_handle) = spawn_output_writer(warn_rx);

    let tracker = Arc::new(StageTracker::new());
    let ingestor = Arc::new(ReportIngestor::new(Some(warn_tx.clone())));

    // Progress lines: diff stage snapshots on each notification and print
    // the stages that changed.
    let progress_sub = if !args.json && !args.quiet {
        let tracker_view = Arc::clone(&tracker);
        let out = out_tx.clone();
        let last = Mutex::new(tracker.stages());
        Some(tracker.notifier().subscribe(move || {
            let current = tracker_view.stages();
            let mut last = last.lock().unwrap();
            for (prev, stage) in last.iter().zip(current.iter()) {
                if prev != stage {
                    let line = match stage.details.as_deref() {
                        Some(details) => {
                            format!("{} {}: {}", stage.status.glyph(), stage.label, details)
                        }
                        None => format!("{} {}", stage.status.glyph(), stage.label),
                    };
                    let _ = out.send(OutputLine::Stderr(line));
                }
            }
            *last = current;
        }))
    } else {
        None
    };

    let engine = CommandEngine::new(&cfg, Some(warn_tx.clone()));
    drop(warn_tx);
    let controller = Arc::new(MigrationController::new(
        engine,
        Arc::clone(&tracker),
        Arc::clone(&ingestor),
        cfg.timeout,
    ));

    // Ctrl-C requests cooperative cancellation; the engine may take a moment
    // to wind down.
    let cancel_on_ctrl_c = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.cancel();
            }
        }
    });

    let outcome = controller.run(&cfg.project_path).await;
    cancel_on_ctrl_c.abort();
    drop(progress_sub);

    let run = match outcome {
        RunOutcome::Finished(run) => run,
        RunOutcome::AlreadyRunning => bail!("a migration run is already in progress"),
    };

    if args.json {
        let doc = serde_json::json!({
            "config": &cfg,
            "started_utc": run.started_utc,
            "finished_utc": run.finished_utc,
            "result": run.result,
            "report": ingestor.tree(),
        });
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&doc)?));
    } else {
        let source = ingestor.source();
        let summary = crate::text_summary::build_text_summary(
            &cfg,
            &run,
            &tracker.stages(),
            &*ingestor,
            source.as_deref(),
        );
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    let code = if run.result.success { 0 } else { 1 };

    // Drop every warn/out sender clone so the writer task drains and exits.
    drop(controller);
    drop(ingestor);
    drop(out_tx);
    let _ = out_handle.await;

    Ok(code)
}
