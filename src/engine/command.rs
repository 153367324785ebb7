//! External migration engine driven as a subprocess.
//!
//! The engine command is invoked with the project path as its final argument
//! and speaks JSON lines on stdout, tagged by `event`:
//!
//! ```text
//! {"event":"stage","stage":3,"status":"in_progress","details":"javac"}
//! {"event":"result","success":true,"report_path":"/tmp/report.json"}
//! ```
//!
//! Stderr and unparseable stdout lines are relayed to the warning channel so
//! engine chatter stays visible. Exiting without a result line is a hard
//! fault, which the run controller folds into a failed result.

use super::{CancelFlag, MigrationEngine, ProgressSender};
use crate::model::{MigrationResult, ProgressUpdate, RunConfig, StageStatus};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EngineLine {
    Stage {
        stage: usize,
        status: StageStatus,
        #[serde(default)]
        details: Option<String>,
    },
    Result {
        #[serde(flatten)]
        result: MigrationResult,
    },
}

pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    warn_tx: Option<UnboundedSender<String>>,
}

impl CommandEngine {
    pub fn new(cfg: &RunConfig, warn_tx: Option<UnboundedSender<String>>) -> Self {
        Self {
            program: cfg.engine_cmd.clone(),
            args: cfg.engine_args.clone(),
            warn_tx,
        }
    }

    fn warn(&self, message: String) {
        if let Some(tx) = self.warn_tx.as_ref() {
            let _ = tx.send(message);
        }
    }
}

#[async_trait]
impl MigrationEngine for CommandEngine {
    async fn run(
        &self,
        project: &Path,
        progress: ProgressSender,
        cancel: CancelFlag,
    ) -> Result<MigrationResult> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(project)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start migration engine `{}`", self.program))?;

        let stdout = child.stdout.take().context("engine stdout unavailable")?;
        if let (Some(stderr), Some(tx)) = (child.stderr.take(), self.warn_tx.clone()) {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send(format!("engine: {line}"));
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        let mut result: Option<MigrationResult> = None;
        let mut kill_sent = false;
        // Poll the advisory cancel flag between lines; a long-silent engine
        // would otherwise never observe the request.
        let mut cancel_poll = tokio::time::interval(Duration::from_millis(200));

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("reading migration engine output")? else {
                        break;
                    };
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<EngineLine>(line) {
                        Ok(EngineLine::Stage { stage, status, details }) => {
                            let _ = progress.send(ProgressUpdate { stage, status, details });
                        }
                        Ok(EngineLine::Result { result: r }) => {
                            result = Some(r);
                        }
                        Err(_) => self.warn(format!("engine: {line}")),
                    }
                }
                _ = cancel_poll.tick() => {
                    if cancel.is_requested() && !kill_sent {
                        kill_sent = true;
                        let _ = child.start_kill();
                    }
                }
            }
        }

        // Stdout EOF does not mean the engine exited: keep relaying the
        // advisory cancel request until the child is reaped. `wait` is
        // cancel-safe, so polling it under a timeout loses nothing.
        let status = loop {
            match tokio::time::timeout(Duration::from_millis(200), child.wait()).await {
                Ok(status) => break status.context("waiting for migration engine")?,
                Err(_) => {
                    if cancel.is_requested() && !kill_sent {
                        kill_sent = true;
                        let _ = child.start_kill();
                    }
                }
            }
        };
        match result {
            Some(result) => Ok(result),
            None if cancel.is_requested() => {
                bail!("migration engine cancelled before reporting a result")
            }
            None => bail!("migration engine exited ({status}) without reporting a result"),
        }
    }
}
