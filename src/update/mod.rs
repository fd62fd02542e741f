//! Decides whether the installed artifact is current and replaces it when
//! it is not.
//!
//! One run moves through `Checking -> Updating -> Done`, or ends in `Failed`
//! from either of the first two. Failures are reported once; nothing here
//! retries.

pub mod auth;
pub mod channel;
pub mod installer;
mod lenient;
pub mod remote;
pub mod version;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{BootError, Result};
use crate::http::Transport;
use crate::storage::{CacheRoot, LocalResource, TtlCachedResource, UnreadablePolicy};

pub use auth::{AuthSession, AuthToken};
pub use channel::ChannelRegistry;
pub use installer::{ActivationTarget, RuntimeCopyActivation};
pub use remote::Endpoints;
pub use version::{Status, UnknownStatus, VersionCatalog, VersionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Checking,
    Updating,
    Done,
    Failed,
}

/// When the installed-version marker is rewritten during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerPolicy {
    /// Before the download starts. A failed download is not retried on the
    /// next run, and the marker may name a version that is not on disk.
    #[default]
    BeforeDownload,
    /// Only after the artifact is completely written.
    AfterInstall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub target: VersionRecord,
    pub installed: Option<String>,
    pub update_needed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate {
        version: String,
    },
    Updated {
        from: Option<String>,
        to: String,
        bytes: u64,
    },
}

pub struct Orchestrator<T: Transport> {
    transport: T,
    catalog: TtlCachedResource,
    marker: LocalResource,
    artifact: LocalResource,
    channels: ChannelRegistry,
    endpoints: Endpoints,
    marker_policy: MarkerPolicy,
    show_progress: bool,
    state: State,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(transport: T, root: &CacheRoot, endpoints: Endpoints) -> Self {
        Self {
            transport,
            catalog: root.catalog(&endpoints.versions),
            marker: root.marker(),
            artifact: root.artifact(),
            channels: ChannelRegistry::default(),
            endpoints,
            marker_policy: MarkerPolicy::default(),
            show_progress: false,
            state: State::Checking,
        }
    }

    pub fn with_channels(mut self, channels: ChannelRegistry) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_marker_policy(mut self, policy: MarkerPolicy) -> Self {
        self.marker_policy = policy;
        self
    }

    pub fn with_unreadable_policy(mut self, policy: UnreadablePolicy) -> Self {
        self.catalog = self.catalog.with_unreadable_policy(policy);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn artifact(&self) -> &LocalResource {
        &self.artifact
    }

    pub fn catalog_cache(&self) -> &TtlCachedResource {
        &self.catalog
    }

    /// Name recorded by the last install, if any. Leaves the marker's
    /// modification time alone.
    pub fn installed_version(&self) -> Result<Option<String>> {
        let Some(content) = self.marker.peek_to_string()? else {
            return Ok(None);
        };
        let name = content.lines().next().unwrap_or("").trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    pub fn catalog(&self) -> Result<VersionCatalog> {
        VersionCatalog::lookup(&self.catalog, &self.transport)
    }

    /// Resolve the target for `channel` and compare it with what is
    /// installed. Neither marker nor artifact is written or touched.
    pub fn check(&self, channel: &str) -> Result<Plan> {
        let channel = self.channels.resolve(channel)?;
        let catalog = self.catalog()?;
        let target = channel.select(&catalog)?.clone();
        let installed = self.installed_version()?;

        let current = installed
            .as_deref()
            .map(|name| name.eq_ignore_ascii_case(target.name()))
            .unwrap_or(false);
        let update_needed = !(current && self.artifact.is_usable());

        info!(
            channel = channel.name(),
            requested = target.name(),
            installed = installed.as_deref().unwrap_or("none"),
            update_needed,
            "version resolved"
        );
        Ok(Plan {
            target,
            installed,
            update_needed,
        })
    }

    pub fn run(&mut self, channel: &str, secret_key: &str) -> Result<UpdateOutcome> {
        self.transition(State::Checking);
        let plan = match self.check(channel) {
            Ok(plan) => plan,
            Err(e) => return self.fail(e),
        };

        if !plan.update_needed {
            self.transition(State::Done);
            return Ok(UpdateOutcome::UpToDate {
                version: plan.target.name().to_string(),
            });
        }

        self.transition(State::Updating);
        match self.update(&plan, secret_key) {
            Ok(outcome) => {
                self.transition(State::Done);
                Ok(outcome)
            }
            Err(e) => self.fail(e),
        }
    }

    fn update(&self, plan: &Plan, secret_key: &str) -> Result<UpdateOutcome> {
        let target = plan.target.name();
        auth::validate_key(secret_key)?;
        info!(from = plan.installed.as_deref().unwrap_or("none"), to = target, "Updating");

        if self.marker_policy == MarkerPolicy::BeforeDownload {
            self.marker.write_bytes(target.as_bytes())?;
        }

        let session = AuthSession::new(&self.transport, &self.endpoints.authenticate);
        let token = match session.authenticate(secret_key) {
            Ok(token) => token,
            Err(e @ BootError::AuthRejected { .. }) => {
                self.invalidate_install();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let bytes = remote::download_artifact(
            &self.transport,
            &self.endpoints.download,
            target,
            &token,
            &self.artifact,
            self.show_progress,
        )?;

        if self.marker_policy == MarkerPolicy::AfterInstall {
            self.marker.write_bytes(target.as_bytes())?;
        }

        Ok(UpdateOutcome::Updated {
            from: plan.installed.clone(),
            to: target.to_string(),
            bytes,
        })
    }

    /// A rejected key means the installed artifact is no longer ours to run.
    fn invalidate_install(&self) {
        if let Err(e) = self.marker.remove() {
            warn!(error = %e, "failed to remove version marker");
        }
        if self.artifact.exists() {
            if let Err(e) = self.artifact.clear() {
                warn!(error = %e, "failed to clear artifact");
            }
        }
    }

    fn fail<R>(&mut self, error: BootError) -> Result<R> {
        warn!(error = %error, "update failed");
        self.transition(State::Failed);
        Err(error)
    }

    fn transition(&mut self, next: State) {
        debug!(from = ?self.state, to = ?next, "state");
        self.state = next;
    }
}

pub struct BootReport {
    pub update: Result<UpdateOutcome>,
    /// `None` when there was nothing usable to activate.
    pub activation: Option<Result<()>>,
}

/// Run the update, then hand the artifact to `target`. A failed update
/// still activates the previous artifact when one is usable.
pub fn bootstrap<T: Transport, A: ActivationTarget>(
    orchestrator: &mut Orchestrator<T>,
    target: &mut A,
    channel: &str,
    secret_key: &str,
) -> BootReport {
    let update = orchestrator.run(channel, secret_key);

    let usable = orchestrator.artifact().is_usable();
    if update.is_err() && usable {
        warn!("booting previously installed artifact");
    }
    let activation = usable.then(|| {
        info!("Booting..");
        target.activate(orchestrator.artifact().path())
    });

    BootReport { update, activation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedTransport;
    use crate::storage::touch;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};

    const VERSIONS: &str = "https://svc.test/versions";
    const AUTH: &str = "https://svc.test/keyauthenticate.php";
    const DOWNLOAD: &str = "https://svc.test/download-intave.php";

    const CATALOG: &[u8] = br#"[
        {"name": "stable-1", "release": 100, "status": "STABLE"},
        {"name": "v2", "release": 200, "status": "STABLE"},
        {"name": "v3-beta", "release": 300, "status": "LATEST"}
    ]"#;

    fn endpoints() -> Endpoints {
        Endpoints {
            versions: VERSIONS.to_string(),
            authenticate: AUTH.to_string(),
            download: DOWNLOAD.to_string(),
        }
    }

    fn key() -> String {
        "a".repeat(auth::KEY_LENGTH)
    }

    fn setup() -> (tempfile::TempDir, CacheRoot, ScriptedTransport) {
        let temp = tempfile::tempdir().unwrap();
        let root = CacheRoot::at(temp.path().join("cache")).unwrap();
        let transport = ScriptedTransport::new();
        transport.reply(VERSIONS, 200, CATALOG);
        (temp, root, transport)
    }

    fn accept_auth(transport: &ScriptedTransport) {
        transport.reply_with_headers(AUTH, 200, &[("Set-Cookie", "PHPSESSID=s1; path=/")], b"success");
    }

    #[derive(Default)]
    struct RecordingTarget {
        activated: Vec<PathBuf>,
    }

    impl ActivationTarget for RecordingTarget {
        fn activate(&mut self, artifact: &Path) -> Result<()> {
            self.activated.push(artifact.to_path_buf());
            Ok(())
        }

        fn deactivate(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fresh_install() {
        let (_temp, root, transport) = setup();
        accept_auth(&transport);
        transport.reply(DOWNLOAD, 200, b"jar-v2");

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        let outcome = orch.run("stable", &key()).unwrap();

        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                from: None,
                to: "v2".to_string(),
                bytes: 6
            }
        );
        assert_eq!(orch.state(), State::Done);
        assert_eq!(orch.installed_version().unwrap().as_deref(), Some("v2"));
        assert_eq!(std::fs::read(root.artifact().path()).unwrap(), b"jar-v2");
        assert_eq!(
            transport.requests()[2].header_value("Cookie"),
            Some("PHPSESSID=s1")
        );
    }

    #[test]
    fn test_current_install_skips_download() {
        let (_temp, root, transport) = setup();
        root.marker().write_bytes(b"V2\n").unwrap();
        root.artifact().write_bytes(b"jar-v2").unwrap();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        let outcome = orch.run("STABLE", &key()).unwrap();

        assert_eq!(
            outcome,
            UpdateOutcome::UpToDate {
                version: "v2".to_string()
            }
        );
        assert_eq!(orch.state(), State::Done);
        assert_eq!(transport.calls_to(AUTH), 0);
        assert_eq!(transport.calls_to(DOWNLOAD), 0);
    }

    #[test]
    fn test_marker_without_artifact_updates() {
        let (_temp, root, transport) = setup();
        accept_auth(&transport);
        transport.reply(DOWNLOAD, 200, b"jar");
        root.marker().write_bytes(b"v2").unwrap();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        assert!(matches!(
            orch.run("stable", &key()),
            Ok(UpdateOutcome::Updated { .. })
        ));
        assert_eq!(transport.calls_to(DOWNLOAD), 1);
    }

    #[test]
    fn test_failed_download_leaves_marker_ahead_of_artifact() {
        let (_temp, root, transport) = setup();
        accept_auth(&transport);
        transport.broken_stream(DOWNLOAD, b"partial");
        root.artifact().write_bytes(b"jar-v1").unwrap();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        assert!(matches!(
            orch.run("stable", &key()),
            Err(BootError::DownloadFailed { .. })
        ));

        assert_eq!(orch.state(), State::Failed);
        assert_eq!(orch.installed_version().unwrap().as_deref(), Some("v2"));
        assert_eq!(std::fs::read(root.artifact().path()).unwrap(), b"jar-v1");

        // the marker now matches, so the next run does not retry
        let mut next = Orchestrator::new(&transport, &root, endpoints());
        assert!(matches!(
            next.run("stable", &key()),
            Ok(UpdateOutcome::UpToDate { .. })
        ));
        assert_eq!(transport.calls_to(DOWNLOAD), 1);
    }

    #[test]
    fn test_after_install_policy_keeps_marker_on_failure() {
        let (_temp, root, transport) = setup();
        accept_auth(&transport);
        transport.fail(DOWNLOAD, "read timed out");
        root.marker().write_bytes(b"stable-1").unwrap();
        root.artifact().write_bytes(b"jar-v1").unwrap();

        let mut orch = Orchestrator::new(&transport, &root, endpoints())
            .with_marker_policy(MarkerPolicy::AfterInstall);
        assert!(orch.run("stable", &key()).is_err());
        assert_eq!(orch.installed_version().unwrap().as_deref(), Some("stable-1"));

        transport.reply(DOWNLOAD, 200, b"jar-v2");
        let mut retry = Orchestrator::new(&transport, &root, endpoints())
            .with_marker_policy(MarkerPolicy::AfterInstall);
        assert!(matches!(
            retry.run("stable", &key()),
            Ok(UpdateOutcome::Updated { .. })
        ));
        assert_eq!(retry.installed_version().unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_rejected_key_invalidates_install_and_skips_download() {
        let (_temp, root, transport) = setup();
        transport.reply(AUTH, 200, b"failure");
        root.marker().write_bytes(b"stable-1").unwrap();
        root.artifact().write_bytes(b"jar-v1").unwrap();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        assert!(matches!(
            orch.run("stable", &key()),
            Err(BootError::AuthRejected { .. })
        ));

        assert_eq!(transport.calls_to(DOWNLOAD), 0);
        assert_eq!(orch.installed_version().unwrap(), None);
        assert!(!root.artifact().is_usable());
    }

    #[test]
    fn test_success_without_cookies_is_missing_credentials() {
        let (_temp, root, transport) = setup();
        transport.reply(AUTH, 200, b"success");

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        assert!(matches!(
            orch.run("stable", &key()),
            Err(BootError::MissingCredentials)
        ));
        assert_eq!(transport.calls_to(DOWNLOAD), 0);
    }

    #[test]
    fn test_invalid_key_aborts_before_any_write() {
        let (_temp, root, transport) = setup();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        let err = orch.run("stable", "too-short").unwrap_err();

        assert!(err.is_config_error());
        assert!(!root.marker().exists());
        assert_eq!(transport.calls_to(AUTH), 0);
    }

    #[test]
    fn test_unknown_channel_fails_without_network() {
        let (_temp, root, transport) = setup();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        assert!(matches!(
            orch.run("nightly", &key()),
            Err(BootError::UnknownChannel(_))
        ));
        assert_eq!(orch.state(), State::Failed);
        assert_eq!(transport.total_calls(), 0);
    }

    #[test]
    fn test_unpublished_channel_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let root = CacheRoot::at(temp.path()).unwrap();
        let transport = ScriptedTransport::new();
        transport.reply(VERSIONS, 200, br#"[{"name": "a", "release": 1, "status": "OUTDATED"}]"#);

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        assert!(matches!(
            orch.run("latest", &key()),
            Err(BootError::NotFound(_))
        ));
    }

    #[test]
    fn test_check_reports_without_side_effects() {
        let (_temp, root, transport) = setup();
        let orch = Orchestrator::new(&transport, &root, endpoints());

        let plan = orch.check("latest").unwrap();
        assert_eq!(plan.target.name(), "v3-beta");
        assert!(plan.update_needed);
        assert!(!root.marker().exists());
        assert_eq!(transport.calls_to(AUTH), 0);
    }

    #[test]
    fn test_bootstrap_activates_after_update() {
        let (_temp, root, transport) = setup();
        accept_auth(&transport);
        transport.reply(DOWNLOAD, 200, b"jar-v2");

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        let mut target = RecordingTarget::default();
        let report = bootstrap(&mut orch, &mut target, "stable", &key());

        assert!(report.update.is_ok());
        assert!(matches!(report.activation, Some(Ok(()))));
        assert_eq!(target.activated, vec![root.artifact().path().to_path_buf()]);
    }

    #[test]
    fn test_bootstrap_falls_back_to_previous_artifact() {
        let (_temp, root, transport) = setup();
        accept_auth(&transport);
        transport.reply(DOWNLOAD, 502, b"bad gateway");
        root.artifact().write_bytes(b"jar-v1").unwrap();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        let mut target = RecordingTarget::default();
        let report = bootstrap(&mut orch, &mut target, "stable", &key());

        assert!(matches!(report.update, Err(BootError::DownloadFailed { .. })));
        assert!(matches!(report.activation, Some(Ok(()))));
        assert_eq!(target.activated.len(), 1);
    }

    #[test]
    fn test_bootstrap_after_empty_download_activates_previous_artifact() {
        let (_temp, root, transport) = setup();
        accept_auth(&transport);
        transport.reply(DOWNLOAD, 200, b"");
        root.artifact().write_bytes(b"jar-v1").unwrap();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        let mut target = RecordingTarget::default();
        let report = bootstrap(&mut orch, &mut target, "stable", &key());

        assert!(matches!(report.update, Err(BootError::DownloadFailed { .. })));
        assert!(matches!(report.activation, Some(Ok(()))));
        assert_eq!(target.activated.len(), 1);
        assert_eq!(std::fs::read(root.artifact().path()).unwrap(), b"jar-v1");
    }

    #[test]
    fn test_check_leaves_marker_modification_time() {
        let (_temp, root, transport) = setup();
        root.marker().write_bytes(b"v2").unwrap();
        root.artifact().write_bytes(b"jar-v2").unwrap();
        let hour_ago = SystemTime::now() - Duration::from_secs(3600);
        touch(root.marker().path(), hour_ago).unwrap();

        let orch = Orchestrator::new(&transport, &root, endpoints());
        assert!(!orch.check("stable").unwrap().update_needed);
        assert!(root.marker().age().unwrap() >= Duration::from_secs(3500));
    }

    #[test]
    fn test_bootstrap_without_artifact_activates_nothing() {
        let (_temp, root, transport) = setup();
        transport.reply(AUTH, 200, b"failure");
        root.artifact().write_bytes(b"jar-v1").unwrap();

        let mut orch = Orchestrator::new(&transport, &root, endpoints());
        let mut target = RecordingTarget::default();
        let report = bootstrap(&mut orch, &mut target, "stable", &key());

        assert!(report.update.is_err());
        assert!(report.activation.is_none());
        assert!(target.activated.is_empty());
    }
}
