use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Host-side description of a long-lived background task.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub task_name: String,
    pub task_title: String,
    pub task_desc: String,
    /// Respawn the task if it exits abnormally while not cancelled.
    pub restart_on_failure: bool,
    pub restart_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            task_name: "stridesync-daily-sync".into(),
            task_title: "StrideSync".into(),
            task_desc: "Daily step synchronization".into(),
            restart_on_failure: true,
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// Keeps a background task alive for the life of the process.
///
/// The task factory is invoked with a cancellation token and may be invoked
/// again after a panic (the scheduler loop is written to never panic, but a
/// dead sync pipeline would otherwise stay silently dead until reinstall).
/// `stop` is the only teardown path; there is no mid-task cancellation
/// beyond what the task itself observes through the token.
pub struct BackgroundRunner {
    config: RunnerConfig,
    handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl BackgroundRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            handle: None,
            cancel: None,
        }
    }

    pub fn start<F, Fut>(&mut self, task: F) -> Result<()>
    where
        F: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            bail!(
                "background task '{}' is already running",
                self.config.task_name
            );
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            info!(
                "background task '{}' ({}) started",
                config.task_name, config.task_desc
            );

            loop {
                let run = tokio::spawn(task(token.clone()));
                match run.await {
                    Ok(()) => {
                        info!("background task '{}' exited", config.task_name);
                        break;
                    }
                    Err(err) if err.is_panic() => {
                        error!("background task '{}' panicked: {err}", config.task_name);
                        if !config.restart_on_failure || token.is_cancelled() {
                            break;
                        }
                        warn!(
                            "restarting '{}' in {:?}",
                            config.task_name, config.restart_delay
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(config.restart_delay) => {}
                            _ = token.cancelled() => break,
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        self.handle = Some(handle);
        self.cancel = Some(cancel);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal cancellation and wait for the supervised task to drain.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("background task failed to join")?;
        }
        Ok(())
    }
}
