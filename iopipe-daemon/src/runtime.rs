use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use iopipe_core::{load_manifest_at, ManifestError};
use iopipe_sync::{cancellation, synchronize_with, Cancellation};

use crate::config::{is_manifest_file, DaemonConfig};
use crate::error::{io_err, DaemonError};

#[derive(Debug)]
struct SyncJob {
    path: PathBuf,
    source: &'static str,
}

/// Result of handling one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOutcome {
    /// Steps were handed to the pipeline.
    Synced { steps: usize },
    /// Not labelled for sync, or another namespace.
    Skipped,
    /// The manifest vanished before it could be read.
    Missing,
    /// The manifest or its step list is malformed.
    Rejected(String),
}

/// Start the runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Watch `config.manifests_dir` and synchronize marked manifests until Ctrl-C.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let dir = &config.manifests_dir;
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    tracing::info!(
        manifests = %dir.display(),
        namespace = %config.namespace,
        "iopipe watcher starting",
    );

    let (cancel_handle, cancel) = cancellation();
    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let result = watcher_task(config, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = sync_processor_task(config, cancel, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            let result = tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down");
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Signal(err.to_string())),
                },
            };
            cancel_handle.cancel();
            let _ = shutdown.send(());
            result
        })
    };

    let (watcher_result, processor_result, signal_result) =
        tokio::join!(watcher_handle, processor_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("sync_processor", processor_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watcher_task(
    config: DaemonConfig,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // Canonicalize so event paths (real paths on macOS) match `is_manifest_file`.
    let dir = fs::canonicalize(&config.manifests_dir)
        .unwrap_or_else(|_| config.manifests_dir.clone());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event: notify::Result<Event>| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %dir.display(), "watching manifest directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    if !is_manifest_file(&path, &dir) {
                        continue;
                    }
                    if !should_process_event(&mut debounce, &path, Instant::now(), config.debounce) {
                        continue;
                    }
                    sync_tx
                        .send(SyncJob { path, source: "watcher" })
                        .await
                        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;
                }
            }
        }
    }

    Ok(())
}

/// Single consumer of sync jobs, so passes never overlap.
async fn sync_processor_task(
    config: DaemonConfig,
    cancel: Cancellation,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    for path in list_manifests(&config.manifests_dir)? {
        if cancel.is_cancelled() {
            return Ok(());
        }
        handle_job(&config, &cancel, SyncJob { path, source: "startup" }).await;
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            job = sync_rx.recv() => {
                let Some(job) = job else { break };
                handle_job(&config, &cancel, job).await;
            }
        }
    }

    Ok(())
}

async fn handle_job(config: &DaemonConfig, cancel: &Cancellation, job: SyncJob) {
    let started = Instant::now();
    match process_manifest(config, cancel, &job.path).await {
        Ok(outcome) => tracing::info!(
            manifest = %job.path.display(),
            source = job.source,
            outcome = ?outcome,
            duration_ms = started.elapsed().as_millis() as u64,
            "manifest handled",
        ),
        Err(err) => tracing::error!(
            manifest = %job.path.display(),
            source = job.source,
            error = %err,
            "manifest sync failed",
        ),
    }
}

/// Load `path`, check it is marked for this namespace, decode its steps and
/// synchronize them.
///
/// Malformed manifests are reported as [`ManifestOutcome::Rejected`]; only a
/// broken pipeline is an `Err`.
pub async fn process_manifest(
    config: &DaemonConfig,
    cancel: &Cancellation,
    path: &Path,
) -> Result<ManifestOutcome, DaemonError> {
    let owned = path.to_path_buf();
    let loaded = tokio::task::spawn_blocking(move || load_manifest_at(&owned))
        .await
        .map_err(|err| DaemonError::Join {
            task: "manifest load",
            message: err.to_string(),
        })?;

    let manifest = match loaded {
        Ok(manifest) => manifest,
        Err(ManifestError::NotFound { .. }) => {
            tracing::info!(manifest = %path.display(), "manifest does not exist");
            return Ok(ManifestOutcome::Missing);
        }
        Err(err) => {
            tracing::error!(manifest = %path.display(), error = %err, "failed to load manifest");
            return Ok(ManifestOutcome::Rejected(err.to_string()));
        }
    };

    if !manifest.is_marked_for_sync(&config.namespace) {
        tracing::debug!(manifest = %path.display(), "manifest not marked for sync");
        return Ok(ManifestOutcome::Skipped);
    }

    let steps = match manifest.steps() {
        Ok(steps) => steps,
        Err(err) => {
            tracing::error!(manifest = %path.display(), error = %err, "failed to get steps");
            return Ok(ManifestOutcome::Rejected(err.to_string()));
        }
    };

    tracing::info!(
        manifest = %manifest.metadata.name,
        steps = steps.len(),
        "config received",
    );
    synchronize_with(cancel, &config.directories, &steps).await?;
    tracing::info!(manifest = %manifest.metadata.name, "writing config finished");

    Ok(ManifestOutcome::Synced { steps: steps.len() })
}

/// Manifest files already present in `dir`, sorted.
fn list_manifests(dir: &Path) -> Result<Vec<PathBuf>, DaemonError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(dir, err)),
    };
    let mut manifests = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if path.is_file() && is_manifest_file(&path, dir) {
            manifests.push(path);
        }
    }
    manifests.sort();
    Ok(manifests)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iopipe_core::Directories;
    use tempfile::TempDir;
    use tokio::time::advance;

    fn manifest_yaml(namespace: &str, label: &str, input: &Path, output: &Path) -> String {
        format!(
            "metadata:\n  name: pipeline\n  namespace: {namespace}\n  labels:\n    iopipesync: \"{label}\"\ndata:\n  steps: |\n    - id: s1\n      inputDir: {}\n      outputDir: {}\n      configs:\n        dir1: \"01\"\n",
            input.display(),
            output.display(),
        )
    }

    struct Fixture {
        manifests: TempDir,
        input: TempDir,
        output: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let input = TempDir::new().expect("input");
            let dir = input.path().join("dir1").join("01");
            fs::create_dir_all(&dir).expect("mkdir");
            fs::write(dir.join("a.txt"), "hello").expect("write");
            Self {
                manifests: TempDir::new().expect("manifests"),
                input,
                output: TempDir::new().expect("output"),
            }
        }

        fn config(&self) -> DaemonConfig {
            DaemonConfig::new(self.manifests.path(), "team-a").with_directories(Directories::new(
                self.input.path(),
                self.output.path(),
            ))
        }

        fn write_manifest(&self, file: &str, namespace: &str, label: &str) -> PathBuf {
            let path = self.manifests.path().join(file);
            fs::write(
                &path,
                manifest_yaml(namespace, label, self.input.path(), self.output.path()),
            )
            .expect("write manifest");
            path
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_coalesces_rapid_events() {
        let threshold = Duration::from_millis(100);
        let mut debounce = HashMap::<PathBuf, Instant>::new();
        let path = PathBuf::from("/tmp/pipeline.yaml");
        let mut sync_triggers = 0usize;

        for _ in 0..5 {
            if should_process_event(&mut debounce, &path, Instant::now(), threshold) {
                sync_triggers += 1;
            }
            advance(Duration::from_millis(10)).await;
        }
        assert_eq!(sync_triggers, 1, "rapid saves should collapse to one sync");

        advance(Duration::from_millis(150)).await;
        assert!(should_process_event(
            &mut debounce,
            &path,
            Instant::now(),
            threshold
        ));
    }

    #[tokio::test]
    async fn marked_manifest_is_synchronized() {
        let fx = Fixture::new();
        let path = fx.write_manifest("pipeline.yaml", "team-a", "yes");

        let outcome = process_manifest(&fx.config(), &Cancellation::never(), &path)
            .await
            .expect("process");
        assert_eq!(outcome, ManifestOutcome::Synced { steps: 1 });
        assert!(fx.output.path().join("id-s1.a.gz").is_file());
    }

    #[tokio::test]
    async fn unmarked_or_foreign_manifests_are_skipped() {
        let fx = Fixture::new();
        let unmarked = fx.write_manifest("unmarked.yaml", "team-a", "no");
        let foreign = fx.write_manifest("foreign.yaml", "team-b", "yes");

        for path in [unmarked, foreign] {
            let outcome = process_manifest(&fx.config(), &Cancellation::never(), &path)
                .await
                .expect("process");
            assert_eq!(outcome, ManifestOutcome::Skipped);
        }
        assert_eq!(fs::read_dir(fx.output.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_and_malformed_manifests_are_reported() {
        let fx = Fixture::new();
        let missing = fx.manifests.path().join("gone.yaml");
        let outcome = process_manifest(&fx.config(), &Cancellation::never(), &missing)
            .await
            .expect("process");
        assert_eq!(outcome, ManifestOutcome::Missing);

        let no_steps = fx.manifests.path().join("nosteps.yaml");
        fs::write(
            &no_steps,
            "metadata:\n  namespace: team-a\n  labels:\n    iopipesync: \"yes\"\ndata: {}\n",
        )
        .expect("write");
        let outcome = process_manifest(&fx.config(), &Cancellation::never(), &no_steps)
            .await
            .expect("process");
        assert!(
            matches!(outcome, ManifestOutcome::Rejected(ref msg) if msg.contains("<steps>")),
            "got: {outcome:?}"
        );
    }

    #[test]
    fn list_manifests_ignores_other_files() {
        let fx = Fixture::new();
        fx.write_manifest("b.yaml", "team-a", "yes");
        fx.write_manifest("a.yml", "team-a", "yes");
        fs::write(fx.manifests.path().join("README.md"), "docs").unwrap();
        fs::create_dir(fx.manifests.path().join("nested.yaml")).unwrap();

        let found = list_manifests(fx.manifests.path()).expect("list");
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);
    }

    #[tokio::test]
    async fn processor_handles_startup_manifests_then_queued_jobs() {
        let fx = Fixture::new();
        fx.write_manifest("startup.yaml", "team-a", "yes");

        let (sync_tx, sync_rx) = mpsc::channel(4);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let processor = tokio::spawn(sync_processor_task(
            fx.config(),
            Cancellation::never(),
            sync_rx,
            shutdown_tx.subscribe(),
        ));

        // A second step id proves the queued job ran after the startup scan.
        let queued = fx.manifests.path().join("queued.yaml");
        fs::write(
            &queued,
            manifest_yaml("team-a", "yes", fx.input.path(), fx.output.path())
                .replace("id: s1", "id: s2"),
        )
        .expect("write");
        sync_tx
            .send(SyncJob {
                path: queued,
                source: "test",
            })
            .await
            .expect("queue job");
        drop(sync_tx);

        processor.await.expect("join").expect("processor");
        assert!(fx.output.path().join("id-s1.a.gz").is_file());
        assert!(fx.output.path().join("id-s2.a.gz").is_file());
    }
}
