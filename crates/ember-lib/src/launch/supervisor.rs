/// The launch supervisor: resolves a Java runtime, repairs game files,
/// spawns the game process and supervises its output until exit.
///
/// One logical flow per launch attempt; every asynchronous step is issued
/// sequentially and every failure is converted into a single user-visible
/// notification before the pipeline returns to idle.
use super::process;
use super::types::{LaunchSession, LaunchState, ProcessDescription};
use super::watcher::{LogWatcher, StreamKind, WatcherCallback, WatcherId, WatcherSet};
use crate::config::{AuthUser, LauncherSettings};
use crate::distribution::{Distribution, ServerEntry};
use crate::error::{LaunchError, RepairPhase};
use crate::java::acquisition::JvmAcquisition;
use crate::java::{JavaOptions, JvmDetails, JvmResolver};
use crate::presence::PresenceState;
use crate::presence::PresenceNotifier;
use crate::progress::{DetailTicker, FailureSink, ProgressSink};
use crate::repair::RepairProvider;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Child;
use tokio::time::Instant;
use uuid::Uuid;

/// Minimum duration the loading UI stays visible after spawn, even when the
/// engine reports ready sooner. Prevents a flicker on fast starts.
pub const MIN_LINGER: Duration = Duration::from_millis(5000);

/// First-winner guard between the deferred ready transition, a fatal log
/// signature and process exit. Whoever resolves it first acts; everyone else
/// becomes a no-op.
struct ReadyGate {
    resolved: AtomicBool,
}

impl ReadyGate {
    fn new() -> Self {
        Self {
            resolved: AtomicBool::new(false),
        }
    }

    fn try_resolve(&self) -> bool {
        self.resolved
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }
}

/// State shared with the watcher callbacks and the exit monitor.
struct Shared {
    state: Mutex<LaunchState>,
    session: Mutex<Option<LaunchSession>>,
    /// A specific post-spawn failure has already been surfaced; suppresses
    /// the generic non-zero-exit report.
    failure_reported: AtomicBool,
    progress: Arc<dyn ProgressSink>,
    failures: Arc<dyn FailureSink>,
    presence: Arc<dyn PresenceNotifier>,
}

impl Shared {
    fn set_state(&self, next: LaunchState) {
        let mut state = self.state.lock().unwrap();
        if state.may_enter(next) {
            log::debug!("Launch state: {:?} -> {:?}", *state, next);
            *state = next;
        } else {
            log::warn!(
                "Ignoring invalid launch state transition {:?} -> {:?}",
                *state,
                next
            );
        }
    }

    /// Surface a failure: absorb into `Error`, one dialog, busy UI off.
    fn fail(&self, err: &LaunchError) {
        self.set_state(LaunchState::Error);
        self.failures.show_failure(err.title(), &err.description());
        self.progress.set_busy(false);
        self.progress.set_os_progress(-1.0);
    }
}

/// Orchestrates the whole launch pipeline and owns the single in-flight
/// game process.
pub struct ProcessSupervisor {
    settings: Mutex<LauncherSettings>,
    resolver: Arc<dyn JvmResolver>,
    acquisition: Arc<dyn JvmAcquisition>,
    repairs: Arc<dyn RepairProvider>,
    shared: Arc<Shared>,
    linger: Duration,
}

impl ProcessSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: LauncherSettings,
        resolver: Arc<dyn JvmResolver>,
        acquisition: Arc<dyn JvmAcquisition>,
        repairs: Arc<dyn RepairProvider>,
        progress: Arc<dyn ProgressSink>,
        failures: Arc<dyn FailureSink>,
        presence: Arc<dyn PresenceNotifier>,
    ) -> Self {
        Self {
            settings: Mutex::new(settings),
            resolver,
            acquisition,
            repairs,
            shared: Arc::new(Shared {
                state: Mutex::new(LaunchState::Idle),
                session: Mutex::new(None),
                failure_reported: AtomicBool::new(false),
                progress,
                failures,
                presence,
            }),
            linger: MIN_LINGER,
        }
    }

    /// Override the minimum-linger duration (UI polish knob; the default is
    /// [`MIN_LINGER`]).
    pub fn with_minimum_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn state(&self) -> LaunchState {
        *self.shared.state.lock().unwrap()
    }

    /// PID of the live game process, if any.
    pub fn session_pid(&self) -> Option<u32> {
        self.shared.session.lock().unwrap().as_ref().map(|s| s.pid)
    }

    pub fn settings_snapshot(&self) -> LauncherSettings {
        self.settings.lock().unwrap().clone()
    }

    /// Run the full launch pipeline for `server`.
    ///
    /// Returns once the game process has been spawned and its watchers are
    /// attached; post-spawn supervision continues in the background. A
    /// second call while any session is active is rejected with
    /// [`LaunchError::LaunchBusy`] and no failure dialog.
    pub async fn launch(
        &self,
        distro: &Distribution,
        server: &ServerEntry,
        user: Option<AuthUser>,
    ) -> Result<(), LaunchError> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state != LaunchState::Idle {
                log::warn!("Launch rejected, pipeline is {:?}", *state);
                return Err(LaunchError::LaunchBusy);
            }
            *state = LaunchState::ResolvingJava;
        }

        log::info!("Launching server {}", server.id);
        self.shared.progress.set_busy(true);
        self.shared.progress.set_detail("Please wait..");
        self.shared.progress.set_percent(0);

        match self.run_pipeline(distro, server, user).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.is_reportable() {
                    self.shared.fail(&err);
                    self.shared.set_state(LaunchState::Idle);
                }
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        distro: &Distribution,
        server: &ServerEntry,
        user: Option<AuthUser>,
    ) -> Result<(), LaunchError> {
        let details = self.resolve_runtime(server).await?;
        self.repair_files(server).await?;
        self.spawn_and_supervise(distro, server, details, user).await
    }

    /// Step 1 (and the post-acquisition re-check): find a usable runtime.
    async fn resolve_runtime(&self, server: &ServerEntry) -> Result<JvmDetails, LaunchError> {
        let options = &server.java_options;
        let data_dir = self.settings.lock().unwrap().data_dir.clone();

        // A per-server override short-circuits discovery while it validates.
        let override_exec = self
            .settings
            .lock()
            .unwrap()
            .java_override(&server.id)
            .cloned();
        if let Some(exec) = override_exec {
            self.shared
                .progress
                .set_detail("Checking configured Java runtime..");
            match self
                .resolver
                .validate(&exec, &options.supported)
                .await
                .map_err(LaunchError::Resolution)?
            {
                Some(details) => return Ok(details),
                None => log::info!("Configured Java executable no longer valid, rescanning"),
            }
        }

        for attempt in 0..2u8 {
            self.shared
                .progress
                .set_detail("Checking system for a compatible Java runtime..");
            if let Some(details) = self
                .resolver
                .resolve(&data_dir, &options.supported)
                .await
                .map_err(LaunchError::Resolution)?
            {
                self.persist_java_override(&server.id, &details.path);
                return Ok(details);
            }
            if attempt == 0 {
                // The normal "nothing installed" signal; not an error.
                log::info!(
                    "No compatible Java installation found, acquiring Java {}",
                    options.suggested_major
                );
                self.acquire_runtime(server, options, &data_dir).await?;
                // Loop back: the freshly extracted runtime has to prove
                // itself through the resolver like any other installation.
            }
        }

        log::error!("Runtime still unusable after acquisition");
        Err(LaunchError::Acquisition {
            major: options.suggested_major,
            distribution: options.distribution.to_string(),
        })
    }

    /// Step 2: download and extract a runtime release.
    async fn acquire_runtime(
        &self,
        server: &ServerEntry,
        options: &JavaOptions,
        data_dir: &Path,
    ) -> Result<(), LaunchError> {
        self.shared.set_state(LaunchState::AcquiringJava);
        self.shared.progress.set_detail("Preparing Java download..");
        self.shared.progress.set_percent(0);

        let no_release = || LaunchError::Acquisition {
            major: options.suggested_major,
            distribution: options.distribution.to_string(),
        };

        let asset = match self
            .acquisition
            .fetch_release(options.suggested_major, data_dir, options.distribution)
            .await
        {
            Ok(Some(asset)) => asset,
            Ok(None) => return Err(no_release()),
            Err(e) => {
                log::error!("Release catalogue query failed: {:#}", e);
                return Err(no_release());
            }
        };

        self.shared.progress.set_detail("Downloading Java runtime..");
        let size = asset.size.max(1);
        let byte_progress = self.shared.progress.clone();
        let transferred = self
            .acquisition
            .download(
                &asset,
                Arc::new(move |bytes| {
                    let percent = (bytes.saturating_mul(100) / size).min(100) as u8;
                    byte_progress.set_percent(percent);
                    byte_progress.set_os_progress(f64::from(percent) / 100.0);
                }),
            )
            .await
            .map_err(|e| {
                log::error!("Runtime download failed: {:#}", e);
                no_release()
            })?;
        self.shared.progress.set_percent(100);
        self.shared.progress.set_os_progress(1.0);

        if transferred != asset.size {
            // The byte count lies on some proxies; the checksum decides.
            log::warn!(
                "Runtime download: expected {} bytes but received {}",
                asset.size,
                transferred
            );
            let valid = self.acquisition.validate_archive(&asset).await.map_err(|e| {
                log::error!("Archive validation failed: {:#}", e);
                LaunchError::CorruptedDownload {
                    path: asset.path.clone(),
                }
            })?;
            if !valid {
                return Err(LaunchError::CorruptedDownload {
                    path: asset.path.clone(),
                });
            }
        }

        // Extraction reports no granular progress; animate the detail line.
        self.shared.progress.set_os_progress(-1.0);
        let ticker = DetailTicker::start(self.shared.progress.clone(), "Extracting Java runtime");
        let extracted = self.acquisition.extract(&asset.path).await;
        ticker.stop();
        let exec = extracted.map_err(|e| {
            log::error!("Runtime extraction failed: {:#}", e);
            no_release()
        })?;
        self.shared.progress.set_detail("Java installed!");

        // Remember the new runtime; the re-check still has the last word.
        self.persist_java_override(&server.id, &exec);
        self.shared.set_state(LaunchState::ResolvingJava);
        Ok(())
    }

    fn persist_java_override(&self, server_id: &str, exec: &Path) {
        let mut settings = self.settings.lock().unwrap();
        settings.set_java_override(server_id, exec.to_path_buf());
        if let Err(e) = settings.save() {
            log::warn!("Failed to persist Java executable: {:#}", e);
        }
    }

    /// Step 3: verify the installation and fetch whatever is invalid.
    async fn repair_files(&self, server: &ServerEntry) -> Result<(), LaunchError> {
        self.shared.set_state(LaunchState::Repairing);
        self.shared.progress.set_detail("Validating file integrity..");
        self.shared.progress.set_percent(0);

        let repair = self.repairs.repair_for(server);

        let verify_progress = self.shared.progress.clone();
        let invalid = repair
            .verify(Arc::new(move |percent| verify_progress.set_percent(percent)))
            .await
            .map_err(|cause| LaunchError::Repair {
                phase: RepairPhase::Verify,
                cause,
            })?;
        self.shared.progress.set_percent(100);

        if invalid > 0 {
            log::info!("Downloading {} invalid files", invalid);
            self.shared.progress.set_detail("Downloading files..");
            self.shared.progress.set_percent(0);
            let download_progress = self.shared.progress.clone();
            repair
                .download(Arc::new(move |percent| {
                    download_progress.set_percent(percent);
                    download_progress.set_os_progress(f64::from(percent) / 100.0);
                }))
                .await
                .map_err(|cause| LaunchError::Repair {
                    phase: RepairPhase::Download,
                    cause,
                })?;
            self.shared.progress.set_percent(100);
        } else {
            log::info!("No invalid files, skipping download");
        }
        self.shared.progress.set_os_progress(-1.0);
        Ok(())
    }

    /// Steps 4-5: spawn the process and attach the output watchers.
    async fn spawn_and_supervise(
        &self,
        distro: &Distribution,
        server: &ServerEntry,
        details: JvmDetails,
        user: Option<AuthUser>,
    ) -> Result<(), LaunchError> {
        self.shared.set_state(LaunchState::Launching);
        self.shared.progress.set_detail("Launching the game..");
        self.shared.failure_reported.store(false, Ordering::SeqCst);

        let (game_dir, common_dir) = {
            let settings = self.settings.lock().unwrap();
            (settings.instance_dir().join(&server.id), settings.common_dir())
        };
        std::fs::create_dir_all(&game_dir).map_err(LaunchError::Spawn)?;

        let desc = ProcessDescription {
            server_id: server.id.clone(),
            server_address: server.address.clone(),
            runtime: details.path.clone(),
            loader: server.loader.clone(),
            version: server.version.clone(),
            user: user.clone(),
            client_version: server.client_version.clone(),
            game_dir,
            common_dir,
        };

        let mut child = process::spawn(&desc).map_err(LaunchError::Spawn)?;
        let pid = child.id().unwrap_or(0);
        let spawned_at = Instant::now();
        log::info!("Game process started with PID {}", pid);

        let watchers = Arc::new(WatcherSet::new());
        process::attach_stream_readers(&mut child, watchers.clone());

        let presence_config = match (distro.presence.clone(), server.presence.clone()) {
            (Some(app), Some(srv)) => Some((app, srv)),
            _ => None,
        };
        let presence_enabled = presence_config.is_some();

        {
            let mut session = self.shared.session.lock().unwrap();
            *session = Some(LaunchSession {
                id: Uuid::new_v4(),
                server_id: server.id.clone(),
                runtime_exec: details.path,
                pid,
                spawned_at,
                started_at: chrono::Utc::now(),
                presence_enabled,
            });
        }

        if let Some((app, srv)) = &presence_config {
            self.shared.presence.start(app, srv);
        }

        self.shared.progress.set_detail("Done. Enjoy the server!");

        let gate = Arc::new(ReadyGate::new());
        self.wire_watchers(
            server,
            user.as_ref(),
            &watchers,
            &gate,
            spawned_at,
            presence_enabled,
        );
        self.spawn_exit_monitor(child, gate);
        Ok(())
    }

    /// Attach the readiness and fatal-signature watchers.
    fn wire_watchers(
        &self,
        server: &ServerEntry,
        user: Option<&AuthUser>,
        watchers: &Arc<WatcherSet>,
        gate: &Arc<ReadyGate>,
        spawned_at: Instant,
        presence_enabled: bool,
    ) {
        let patterns = &server.patterns;
        let ready_id: Arc<OnceCell<WatcherId>> = Arc::new(OnceCell::new());
        let fatal_id: Arc<OnceCell<WatcherId>> = Arc::new(OnceCell::new());

        // The ready transition proper: runs at most once, from either the
        // match path or the deferred linger timer.
        let on_ready: Arc<dyn Fn() + Send + Sync> = {
            let shared = self.shared.clone();
            let watchers = watchers.clone();
            let gate = gate.clone();
            let ready_id = ready_id.clone();
            let fatal_id = fatal_id.clone();
            let world_pattern = patterns.world_loading_pattern();
            let joined_pattern = user.map(|u| patterns.joined_pattern(&u.display_name));
            Arc::new(move || {
                if !gate.try_resolve() {
                    return;
                }
                log::info!("Engine ready, closing the launch area");
                shared.set_state(LaunchState::Running);
                shared.progress.set_busy(false);
                if let Some(id) = ready_id.get() {
                    watchers.detach(*id);
                }
                if let Some(id) = fatal_id.get() {
                    watchers.detach(*id);
                }
                if presence_enabled {
                    shared.presence.update_state(PresenceState::Loading);
                    // In-game chatter drives presence for the process's
                    // remaining lifetime.
                    let world_shared = shared.clone();
                    watchers.attach(LogWatcher::new(
                        StreamKind::Stdout,
                        world_pattern.clone(),
                        Arc::new(move |_| {
                            world_shared.presence.update_state(PresenceState::Joining);
                        }),
                    ));
                    if let Some(joined) = &joined_pattern {
                        let joined_shared = shared.clone();
                        watchers.attach(LogWatcher::new(
                            StreamKind::Stdout,
                            joined.clone(),
                            Arc::new(move |_| {
                                joined_shared.presence.update_state(PresenceState::Joined);
                            }),
                        ));
                    }
                }
            })
        };

        // Readiness watcher: a match inside the linger window defers the
        // transition; the gate keeps a later fatal signature in charge.
        let linger = self.linger;
        let ready_cb: WatcherCallback = {
            let gate = gate.clone();
            let on_ready = on_ready.clone();
            Arc::new(move |_line| {
                if gate.resolved() {
                    return;
                }
                let elapsed = spawned_at.elapsed();
                if elapsed < linger {
                    log::debug!(
                        "Engine ready after {:?}, deferring for {:?}",
                        elapsed,
                        linger - elapsed
                    );
                    let on_ready = on_ready.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(linger - elapsed).await;
                        on_ready();
                    });
                } else {
                    on_ready();
                }
            })
        };
        let id = watchers.attach(LogWatcher::new(
            StreamKind::Stdout,
            patterns.ready_pattern(),
            ready_cb,
        ));
        let _ = ready_id.set(id);

        // Fatal watcher: a known-bad stderr line fails the launch outright,
        // even while the process keeps running.
        let fatal_pattern =
            Regex::new(&regex::escape(patterns.fatal_signature())).expect("escaped literal");
        let fatal_cb: WatcherCallback = {
            let shared = self.shared.clone();
            let gate = gate.clone();
            Arc::new(move |line| {
                if !gate.try_resolve() {
                    return;
                }
                log::error!("Fatal signature in game output: {}", line.text.trim());
                shared.failure_reported.store(true, Ordering::SeqCst);
                shared.fail(&LaunchError::RuntimeFatal {
                    signature: line.text.trim().to_string(),
                });
            })
        };
        let id = watchers.attach(LogWatcher::new(StreamKind::Stderr, fatal_pattern, fatal_cb));
        let _ = fatal_id.set(id);
    }

    /// Step 6: watch for process termination and tear the session down.
    fn spawn_exit_monitor(&self, mut child: Child, gate: Arc<ReadyGate>) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let status = child.wait().await;

            // Exit also wins any pending deferred-ready transition.
            let won_gate = gate.try_resolve();

            let session = shared.session.lock().unwrap().take();
            if let Some(session) = &session {
                if session.presence_enabled {
                    log::info!("Shutting down presence integration");
                    shared.presence.stop();
                }
            }

            match status {
                Ok(status) => {
                    let code = status.code().unwrap_or(-1);
                    if code != 0 && !shared.failure_reported.swap(true, Ordering::SeqCst) {
                        log::error!("Game process exited with code {}", code);
                        shared.fail(&LaunchError::NonZeroExit { code });
                    } else {
                        log::info!("Game process exited with code {}", code);
                        if won_gate {
                            // Never got to Running; make sure the loading UI
                            // is not left stuck.
                            shared.progress.set_busy(false);
                        }
                    }
                }
                Err(e) => {
                    log::error!("Failed to wait on game process: {}", e);
                    shared.progress.set_busy(false);
                }
            }

            shared.set_state(LaunchState::Idle);
        });
    }
}
