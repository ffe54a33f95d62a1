//! Launch pipeline scenarios with mock collaborators.
//!
//! Spawn-based scenarios run a real `/bin/sh` child and are unix-only; the
//! pre-spawn failure scenarios are platform-neutral.
use super::supervisor::ProcessSupervisor;
use super::types::LaunchState;
use crate::config::LauncherSettings;
use crate::distribution::{
    Distribution, FileManifest, HashAlgo, LoaderMetadata, ServerEntry, VersionMetadata,
    WatcherPatterns,
};
use crate::error::LaunchError;
use crate::java::acquisition::{ByteProgress, JvmAcquisition, ReleaseAsset};
use crate::java::{JavaOptions, JdkDistribution, JvmDetails, JvmResolver, VersionRange};
use crate::presence::{PresenceConfig, PresenceNotifier, PresenceState, ServerPresence};
use crate::progress::{FailureSink, ProgressSink};
use crate::repair::{IntegrityRepair, PercentProgress, RepairProvider};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockResolver {
    resolve_results: Mutex<VecDeque<Option<JvmDetails>>>,
    resolve_calls: AtomicUsize,
}

impl MockResolver {
    fn with_results(results: Vec<Option<JvmDetails>>) -> Self {
        Self {
            resolve_results: Mutex::new(results.into()),
            resolve_calls: AtomicUsize::new(0),
        }
    }
}

impl JvmResolver for MockResolver {
    fn resolve<'a>(
        &'a self,
        _data_dir: &'a Path,
        _supported: &'a VersionRange,
    ) -> BoxFuture<'a, Result<Option<JvmDetails>>> {
        Box::pin(async move {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .resolve_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(None))
        })
    }

    fn validate<'a>(
        &'a self,
        exec: &'a Path,
        _supported: &'a VersionRange,
    ) -> BoxFuture<'a, Result<Option<JvmDetails>>> {
        Box::pin(async move {
            Ok(Some(JvmDetails {
                path: exec.to_path_buf(),
                major_version: 17,
            }))
        })
    }
}

struct MockAcquisition {
    release: Option<ReleaseAsset>,
    transferred: u64,
    archive_valid: bool,
    exec: PathBuf,
    fetch_calls: AtomicUsize,
    download_calls: AtomicUsize,
    validate_calls: AtomicUsize,
    extract_calls: AtomicUsize,
}

impl Default for MockAcquisition {
    fn default() -> Self {
        Self {
            release: None,
            transferred: 0,
            archive_valid: true,
            exec: PathBuf::from("/bin/sh"),
            fetch_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            extract_calls: AtomicUsize::new(0),
        }
    }
}

impl JvmAcquisition for MockAcquisition {
    fn fetch_release<'a>(
        &'a self,
        _major: u32,
        _data_dir: &'a Path,
        _distribution: JdkDistribution,
    ) -> BoxFuture<'a, Result<Option<ReleaseAsset>>> {
        Box::pin(async move {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.release.clone())
        })
    }

    fn download<'a>(
        &'a self,
        _asset: &'a ReleaseAsset,
        on_progress: ByteProgress,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            on_progress(self.transferred);
            Ok(self.transferred)
        })
    }

    fn validate_archive<'a>(&'a self, _asset: &'a ReleaseAsset) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.validate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.archive_valid)
        })
    }

    fn extract<'a>(&'a self, _archive: &'a Path) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.exec.clone())
        })
    }
}

#[derive(Default)]
struct MockRepair {
    invalid_count: usize,
    verify_error: bool,
    download_error: bool,
    verify_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl IntegrityRepair for MockRepair {
    fn verify<'a>(&'a self, on_progress: PercentProgress) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            if self.verify_error {
                anyhow::bail!("manifest fetch refused");
            }
            on_progress(100);
            Ok(self.invalid_count)
        })
    }

    fn download<'a>(&'a self, on_progress: PercentProgress) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            if self.download_error {
                anyhow::bail!("mirror unreachable");
            }
            on_progress(100);
            Ok(())
        })
    }
}

struct FixedRepairProvider(Arc<MockRepair>);

impl RepairProvider for FixedRepairProvider {
    fn repair_for(&self, _server: &ServerEntry) -> Arc<dyn IntegrityRepair> {
        self.0.clone()
    }
}

#[derive(Default)]
struct RecordingUi {
    busy: Mutex<Vec<bool>>,
    failures: Mutex<Vec<(String, String)>>,
    details: Mutex<Vec<String>>,
    percents: Mutex<Vec<u8>>,
}

impl RecordingUi {
    fn failure_titles(&self) -> Vec<String> {
        self.failures.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    fn last_busy(&self) -> Option<bool> {
        self.busy.lock().unwrap().last().copied()
    }
}

impl ProgressSink for RecordingUi {
    fn set_detail(&self, text: &str) {
        self.details.lock().unwrap().push(text.to_string());
    }
    fn set_percent(&self, percent: u8) {
        self.percents.lock().unwrap().push(percent);
    }
    fn set_busy(&self, busy: bool) {
        self.busy.lock().unwrap().push(busy);
    }
    fn set_os_progress(&self, _fraction: f64) {}
}

impl FailureSink for RecordingUi {
    fn show_failure(&self, title: &str, description: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((title.to_string(), description.to_string()));
    }
}

#[derive(Default)]
struct MockPresence {
    events: Mutex<Vec<String>>,
}

impl PresenceNotifier for MockPresence {
    fn start(&self, _distro: &PresenceConfig, _server: &ServerPresence) {
        self.events.lock().unwrap().push("start".to_string());
    }
    fn update_state(&self, state: PresenceState) {
        self.events.lock().unwrap().push(state.label().to_string());
    }
    fn stop(&self) {
        self.events.lock().unwrap().push("stop".to_string());
    }
}

/// `/bin/sh -c <script>` as the "game": the loader main class carries the
/// `-c` switch and the script rides in as the sole game argument.
fn server_with_script(script: &str) -> ServerEntry {
    ServerEntry {
        id: "test-server".to_string(),
        name: "Test Server".to_string(),
        address: "localhost:25565".to_string(),
        client_version: "1.0.0".to_string(),
        main_server: true,
        java_options: JavaOptions {
            supported: VersionRange::at_least(8),
            suggested_major: 17,
            distribution: JdkDistribution::Temurin,
        },
        presence: Some(ServerPresence {
            short_id: "test".to_string(),
            large_image_text: None,
            large_image_id: None,
        }),
        loader: LoaderMetadata {
            id: "sh".to_string(),
            main_class: "-c".to_string(),
            jvm_args: Vec::new(),
        },
        version: VersionMetadata {
            id: "1.0".to_string(),
            game_args: vec![script.to_string()],
        },
        manifest: FileManifest::default(),
        patterns: WatcherPatterns::default(),
    }
}

fn distro() -> Distribution {
    Distribution {
        version: "1.0.0".to_string(),
        presence: Some(PresenceConfig {
            client_id: "1234567890".to_string(),
            small_image_text: None,
            small_image_id: None,
        }),
        servers: Vec::new(),
    }
}

const READY_LINE: &str = "echo '[12:00:00] [main/INFO]: Engine started'";
const FATAL_LINE: &str =
    "echo 'Error: Could not find or load main class org.ember.loader.Launch' 1>&2";

fn sh_details() -> JvmDetails {
    JvmDetails {
        path: PathBuf::from("/bin/sh"),
        major_version: 17,
    }
}

fn release_asset(size: u64) -> ReleaseAsset {
    ReleaseAsset {
        id: "jdk-17.0.9+9".to_string(),
        url: "https://releases.invalid/jdk-17.tar.gz".to_string(),
        path: PathBuf::from("/tmp/ember-test/jdk-17.tar.gz"),
        size,
        algo: HashAlgo::Sha256,
        hash: "00".to_string(),
    }
}

struct Harness {
    supervisor: ProcessSupervisor,
    resolver: Arc<MockResolver>,
    acquisition: Arc<MockAcquisition>,
    repair: Arc<MockRepair>,
    ui: Arc<RecordingUi>,
    presence: Arc<MockPresence>,
    _tmp: tempfile::TempDir,
}

fn harness(resolver: MockResolver, acquisition: MockAcquisition, repair: MockRepair) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp = tempfile::tempdir().unwrap();
    let settings = LauncherSettings::new(tmp.path());

    let resolver = Arc::new(resolver);
    let acquisition = Arc::new(acquisition);
    let repair = Arc::new(repair);
    let ui = Arc::new(RecordingUi::default());
    let presence = Arc::new(MockPresence::default());

    let supervisor = ProcessSupervisor::new(
        settings,
        resolver.clone(),
        acquisition.clone(),
        Arc::new(FixedRepairProvider(repair.clone())),
        ui.clone(),
        ui.clone(),
        presence.clone(),
    )
    .with_minimum_linger(Duration::from_millis(200));

    Harness {
        supervisor,
        resolver,
        acquisition,
        repair,
        ui,
        presence,
        _tmp: tmp,
    }
}

async fn wait_until(mut pred: impl FnMut() -> bool, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if pred() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pred()
}

#[cfg(unix)]
#[tokio::test]
async fn full_pipeline_reaches_running_with_existing_runtime() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let server = server_with_script(&format!("{READY_LINE}; sleep 1"));

    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| h.supervisor.state() == LaunchState::Running, 3000).await);

    // A runtime was found locally: the acquisition path never runs.
    assert_eq!(h.acquisition.fetch_calls.load(Ordering::SeqCst), 0);
    // Zero invalid files: the repair download never runs.
    assert_eq!(h.repair.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.repair.download_calls.load(Ordering::SeqCst), 0);

    assert!(h.ui.failures.lock().unwrap().is_empty());
    assert_eq!(h.ui.last_busy(), Some(false));
    assert!(h.supervisor.session_pid().is_some());

    let details = h.ui.details.lock().unwrap().clone();
    assert!(details.iter().any(|d| d == "Validating file integrity.."));
    assert!(details.iter().any(|d| d == "Done. Enjoy the server!"));
    // The verify pass drove the percentage all the way to 100.
    assert_eq!(h.ui.percents.lock().unwrap().last().copied(), Some(100));

    // The resolved executable is persisted for the next launch.
    let settings = h.supervisor.settings_snapshot();
    assert_eq!(
        settings.java_override("test-server"),
        Some(&PathBuf::from("/bin/sh"))
    );

    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 3000).await);
    assert!(h.supervisor.session_pid().is_none());
    assert!(h.ui.failures.lock().unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn second_launch_rejected_while_running() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details()), Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let server = server_with_script(&format!("{READY_LINE}; sleep 1"));

    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| h.supervisor.state() == LaunchState::Running, 3000).await);

    let rejected = h.supervisor.launch(&distro(), &server, None).await;
    assert!(matches!(rejected, Err(LaunchError::LaunchBusy)));
    // Rejection is not a failed attempt: no dialog.
    assert!(h.ui.failures.lock().unwrap().is_empty());

    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 3000).await);
}

#[cfg(unix)]
#[tokio::test]
async fn concurrent_launches_spawn_a_single_process() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details()), Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let server = server_with_script("sleep 1");

    let d = distro();
    let (a, b) = tokio::join!(
        h.supervisor.launch(&d, &server, None),
        h.supervisor.launch(&d, &server, None),
    );
    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(matches!(
        [a, b].into_iter().find(|r| r.is_err()),
        Some(Err(LaunchError::LaunchBusy))
    ));
    // Only the winning attempt touched the resolver.
    assert_eq!(h.resolver.resolve_calls.load(Ordering::SeqCst), 1);

    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 4000).await);
}

#[cfg(unix)]
#[tokio::test]
async fn acquisition_flow_loops_back_to_resolver() {
    let h = harness(
        MockResolver::with_results(vec![None, Some(sh_details())]),
        MockAcquisition {
            release: Some(release_asset(100)),
            transferred: 100,
            ..Default::default()
        },
        MockRepair::default(),
    );
    let server = server_with_script(&format!("{READY_LINE}; sleep 0.5"));

    h.supervisor.launch(&distro(), &server, None).await.unwrap();

    assert_eq!(h.acquisition.fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.acquisition.download_calls.load(Ordering::SeqCst), 1);
    // Transferred == size: hash validation never invoked.
    assert_eq!(h.acquisition.validate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.acquisition.extract_calls.load(Ordering::SeqCst), 1);
    // The resolver was re-queried after extraction instead of the extracted
    // path being trusted directly.
    assert_eq!(h.resolver.resolve_calls.load(Ordering::SeqCst), 2);

    assert!(wait_until(|| h.supervisor.state() == LaunchState::Running, 3000).await);
    assert!(h.ui.failures.lock().unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn short_download_with_matching_hash_proceeds() {
    let h = harness(
        MockResolver::with_results(vec![None, Some(sh_details())]),
        MockAcquisition {
            release: Some(release_asset(100)),
            transferred: 90,
            archive_valid: true,
            ..Default::default()
        },
        MockRepair::default(),
    );
    let server = server_with_script("true");

    h.supervisor.launch(&distro(), &server, None).await.unwrap();

    // Transferred != size: hash validation invoked exactly once.
    assert_eq!(h.acquisition.validate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.acquisition.extract_calls.load(Ordering::SeqCst), 1);
    assert!(h.ui.failures.lock().unwrap().is_empty());

    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 3000).await);
}

#[tokio::test]
async fn corrupted_download_aborts_the_attempt() {
    let h = harness(
        MockResolver::with_results(vec![None]),
        MockAcquisition {
            release: Some(release_asset(100)),
            transferred: 90,
            archive_valid: false,
            ..Default::default()
        },
        MockRepair::default(),
    );
    let server = server_with_script("true");

    let err = h.supervisor.launch(&distro(), &server, None).await.unwrap_err();
    assert!(matches!(err, LaunchError::CorruptedDownload { .. }));

    assert_eq!(h.acquisition.validate_calls.load(Ordering::SeqCst), 1);
    // Fatal for the attempt: no silent continuation into extraction.
    assert_eq!(h.acquisition.extract_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ui.failure_titles(), vec!["Java Download Corrupted"]);
    assert_eq!(h.ui.last_busy(), Some(false));
    assert_eq!(h.supervisor.state(), LaunchState::Idle);
    assert!(h.supervisor.session_pid().is_none());
}

#[tokio::test]
async fn missing_release_is_fatal_for_the_attempt() {
    let h = harness(
        MockResolver::with_results(vec![None]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let server = server_with_script("true");

    let err = h.supervisor.launch(&distro(), &server, None).await.unwrap_err();
    assert!(matches!(err, LaunchError::Acquisition { .. }));
    assert_eq!(h.ui.failure_titles(), vec!["No Compatible Java Release"]);
    assert_eq!(h.supervisor.state(), LaunchState::Idle);
}

#[tokio::test]
async fn repair_download_failure_yields_one_repair_dialog() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair {
            invalid_count: 3,
            download_error: true,
            ..Default::default()
        },
    );
    let server = server_with_script("true");

    let err = h.supervisor.launch(&distro(), &server, None).await.unwrap_err();
    assert!(matches!(err, LaunchError::Repair { .. }));

    assert_eq!(h.repair.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.repair.download_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.ui.failure_titles(), vec!["Error During File Download"]);
    assert_eq!(h.ui.last_busy(), Some(false));
    assert_eq!(h.supervisor.state(), LaunchState::Idle);
    assert!(h.supervisor.session_pid().is_none());
}

#[tokio::test]
async fn verify_failure_uses_verification_title() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair {
            verify_error: true,
            ..Default::default()
        },
    );
    let server = server_with_script("true");

    let err = h.supervisor.launch(&distro(), &server, None).await.unwrap_err();
    assert!(matches!(err, LaunchError::Repair { .. }));
    assert_eq!(h.ui.failure_titles(), vec!["Error During File Verification"]);
    assert_eq!(h.repair.download_calls.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn ready_transition_respects_minimum_linger() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let server = server_with_script(&format!("{READY_LINE}; sleep 2"));

    let started = std::time::Instant::now();
    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| h.supervisor.state() == LaunchState::Running, 3000).await);

    // The ready line arrives within milliseconds; the transition still waits
    // out the 200ms linger.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(180), "ready fired at {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1900), "ready fired at {elapsed:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn late_ready_match_fires_immediately() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    // Ready line is emitted well after the 200ms linger has elapsed.
    let server = server_with_script(&format!("sleep 0.5; {READY_LINE}; sleep 1"));

    let started = std::time::Instant::now();
    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| h.supervisor.state() == LaunchState::Running, 4000).await);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(450), "ready fired at {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1400), "ready fired at {elapsed:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn fatal_signature_before_ready_suppresses_the_deferred_transition() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    // Ready is matched first and deferred by the linger; the fatal line
    // arrives inside that window and must win permanently.
    let server = server_with_script(&format!("{READY_LINE}; {FATAL_LINE}; sleep 1"));

    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| !h.ui.failures.lock().unwrap().is_empty(), 3000).await);

    assert_ne!(h.supervisor.state(), LaunchState::Running);
    assert_eq!(h.ui.failure_titles(), vec!["Error During Launch"]);
    assert_eq!(h.ui.last_busy(), Some(false));

    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 4000).await);
    // Still exactly one dialog after exit, and never Running in between.
    assert_eq!(h.ui.failures.lock().unwrap().len(), 1);
    // The ready transition never happened: presence never advanced past start.
    let events = h.presence.events.lock().unwrap().clone();
    assert!(!events.contains(&PresenceState::Loading.label().to_string()));
}

#[cfg(unix)]
#[tokio::test]
async fn nonzero_exit_reports_a_generic_failure() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let server = server_with_script("exit 3");

    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 3000).await);

    let failures = h.ui.failures.lock().unwrap().clone();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "Game Exited Unexpectedly");
    assert!(failures[0].1.contains("code 3"));
    assert!(h.supervisor.session_pid().is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn fatal_signature_suppresses_the_exit_code_dialog() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let server = server_with_script(&format!("{FATAL_LINE}; sleep 0.2; exit 5"));

    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 3000).await);

    // The specific failure was already reported; no second dialog for the
    // non-zero exit code.
    assert_eq!(h.ui.failure_titles(), vec!["Error During Launch"]);
}

#[cfg(unix)]
#[tokio::test]
async fn presence_lifecycle_follows_the_process() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let server = server_with_script(&format!("{READY_LINE}; sleep 0.5"));

    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 4000).await);

    let events = h.presence.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start"));
    assert_eq!(events.last().map(String::as_str), Some("stop"));
    assert!(events.contains(&PresenceState::Loading.label().to_string()));
}

#[cfg(unix)]
#[tokio::test]
async fn presence_disabled_without_both_configs() {
    let h = harness(
        MockResolver::with_results(vec![Some(sh_details())]),
        MockAcquisition::default(),
        MockRepair::default(),
    );
    let mut server = server_with_script(&format!("{READY_LINE}; sleep 0.3"));
    server.presence = None;

    h.supervisor.launch(&distro(), &server, None).await.unwrap();
    assert!(wait_until(|| h.supervisor.state() == LaunchState::Idle, 4000).await);

    assert!(h.presence.events.lock().unwrap().is_empty());
}
