//! The study entry point.
//!
//! [`Study`] implements the host's [`Bootstrap`] lifecycle: it resolves the
//! assignment once, keeps the expiration bookkeeping, wires surfaces through
//! the [`LifecycleController`] and routes host events to the [`Dispatcher`].
//! On uninstall or disable it sends the summary and clears its persisted
//! state; every other shutdown leaves that state for the next run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use studykit_host::{
    Bootstrap, HostContext, HostEvent, PingRecord, Reason, StartupOutcome, SurfaceId,
    TriggerContext,
};
use tracing::{debug, info, warn};

use crate::config::{PrefKeys, StudyConfig};
use crate::dispatcher::{Dispatcher, TriggerOutcome};
use crate::error::{Result, StudyError};
use crate::lifecycle::LifecycleController;
use crate::ping_log::{InMemoryPingLog, JsonlPingLog, PingLog};
use crate::resolver::{Assignment, VariationResolver};
use crate::summary::SummaryReporter;
use crate::surface::{Surface, SurfacePhase};
use crate::treatment::Treatment;

/// Study-level telemetry states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyState {
    /// First run after install
    Enter,
    Installed,
    Active,
    Expired,
    /// The install-time eligibility check failed
    Ineligible,
    /// The user uninstalled or disabled the study
    UserDisable,
}

impl StudyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Installed => "installed",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Ineligible => "ineligible",
            Self::UserDisable => "user-disable",
        }
    }
}

impl fmt::Display for StudyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State fixed for the whole process run.
struct Session {
    assignment: Assignment,
    dispatcher: Dispatcher,
}

/// A running share-button study.
pub struct Study {
    config: Arc<StudyConfig>,
    keys: PrefKeys,
    host: HostContext,
    log: Arc<dyn PingLog>,
    lifecycle: LifecycleController,
    session: OnceLock<Session>,
    ending: AtomicBool,
}

impl Study {
    /// Create a study over an explicit ping log. Fails on invalid config.
    pub fn new(config: StudyConfig, host: HostContext, log: Arc<dyn PingLog>) -> Result<Self> {
        config.validate()?;
        let keys = config.pref_keys();
        let lifecycle = LifecycleController::new(host.clone(), config.element_id.clone());
        Ok(Self {
            config: Arc::new(config),
            keys,
            host,
            log,
            lifecycle,
            session: OnceLock::new(),
            ending: AtomicBool::new(false),
        })
    }

    /// Create a study with the ping log the config names: a JSONL file when
    /// `ping_log.path` is set, in memory otherwise.
    pub fn open(config: StudyConfig, host: HostContext) -> Result<Self> {
        let log: Arc<dyn PingLog> = match &config.ping_log.path {
            Some(path) => Arc::new(JsonlPingLog::new(path)),
            None => Arc::new(InMemoryPingLog::new()),
        };
        Self::new(config, host, log)
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// The resolved assignment, once startup has run.
    pub fn assignment(&self) -> Option<&Assignment> {
        self.session.get().map(|s| &s.assignment)
    }

    pub fn treatment(&self) -> Option<Treatment> {
        self.assignment().map(|a| a.treatment)
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn ping_log(&self) -> &dyn PingLog {
        self.log.as_ref()
    }

    /// Treatment occurrences shown so far (persisted).
    pub fn show_count(&self) -> Result<i64> {
        Ok(self.host.prefs().get_int(&self.keys.counter, 0)?)
    }

    /// Whether the study installed the element (persisted).
    pub fn is_added(&self) -> Result<bool> {
        Ok(self.host.prefs().get_bool(&self.keys.added, false)?)
    }

    /// Whether the study has expired or is being removed.
    pub fn is_ending(&self) -> bool {
        self.ending.load(Ordering::SeqCst)
    }

    /// Persisted expiration instant, if set and parseable.
    pub fn expiration(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .host
            .prefs()
            .get_string(&self.keys.expiration)?
            .and_then(|raw| parse_instant(&raw)))
    }

    // ─── Internals ──────────────────────────────────────────────────

    async fn session(&self) -> Result<&Session> {
        if let Some(session) = self.session.get() {
            return Ok(session);
        }
        let assignment = VariationResolver::new(&self.config)
            .resolve(&self.host)
            .await?;
        info!(
            treatment = %assignment.treatment,
            source = %assignment.source,
            "Resolved study variation"
        );
        let dispatcher = Dispatcher::new(
            assignment.treatment,
            self.config.clone(),
            self.host.clone(),
            self.log.clone(),
        );
        let session = Session {
            assignment,
            dispatcher,
        };
        Ok(self.session.get_or_init(|| session))
    }

    /// Set the expiration instant if it is missing. Runs on every startup.
    fn ensure_expiration(&self) -> Result<DateTime<Utc>> {
        let prefs = self.host.prefs();
        if let Some(raw) = prefs.get_string(&self.keys.expiration)? {
            match parse_instant(&raw) {
                Some(instant) => return Ok(instant),
                None => warn!(value = %raw, "Replacing unparseable expiration instant"),
            }
        }
        let instant = Utc::now() + Duration::days(i64::from(self.config.expiration_days));
        prefs.set(&self.keys.expiration, instant.to_rfc3339().into())?;
        debug!(%instant, "Set study expiration");
        Ok(instant)
    }

    async fn send_state(&self, state: StudyState) {
        let ping = PingRecord::study_state(state.as_str());
        if let Err(e) = self.host.telemetry().send(&ping).await {
            warn!(%state, error = %e, "Failed to send study state");
        }
    }

    fn reset_persisted(&self) -> Result<()> {
        let prefs = self.host.prefs();
        prefs.reset(&self.keys.counter)?;
        prefs.reset(&self.keys.added)?;
        Ok(())
    }

    /// Dispatcher and surface for a UI event, when both exist and the
    /// surface is active.
    fn active(&self, id: SurfaceId) -> Option<(&Dispatcher, Arc<Surface>)> {
        let session = self.session.get()?;
        let surface = self.lifecycle.surface(id)?;
        (surface.phase() == SurfacePhase::Active).then(|| (&session.dispatcher, surface))
    }

    async fn on_copy(&self, id: SurfaceId, context: &TriggerContext) -> Result<()> {
        let Some((dispatcher, surface)) = self.active(id) else {
            debug!(surface = %id, "Copy on inactive surface ignored");
            return Ok(());
        };
        let outcome = dispatcher.trigger(&surface, context).await?;
        if outcome == TriggerOutcome::Abandoned {
            debug!(surface = %id, "Treatment abandoned by teardown");
        }
        Ok(())
    }

    async fn on_offer_accepted(&self, id: SurfaceId) -> Result<()> {
        let Some((dispatcher, surface)) = self.active(id) else {
            return Ok(());
        };
        let outcome = dispatcher.accept_offer(&surface).await?;
        debug!(surface = %id, %outcome, "Offer accepted");
        Ok(())
    }

    fn on_highlight_ended(&self, id: SurfaceId) -> Result<()> {
        match self.active(id) {
            Some((dispatcher, surface)) => dispatcher.end_highlight(&surface),
            None => Ok(()),
        }
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl Bootstrap for Study {
    type Error = StudyError;

    async fn startup(&self, reason: Reason) -> Result<StartupOutcome> {
        info!(%reason, "Starting study");
        self.session().await?;
        let expires = self.ensure_expiration()?;

        if reason == Reason::Install {
            self.reset_persisted()?;
            self.send_state(StudyState::Enter).await;
            if !self.host.eligibility().is_eligible().await? {
                info!("Client not eligible; ending study");
                self.send_state(StudyState::Ineligible).await;
                self.ending.store(true, Ordering::SeqCst);
                return Ok(StartupOutcome::Ineligible);
            }
            self.send_state(StudyState::Installed).await;
        } else {
            self.send_state(StudyState::Active).await;
        }

        if Utc::now() > expires {
            info!(%expires, "Study expired");
            self.send_state(StudyState::Expired).await;
            self.ending.store(true, Ordering::SeqCst);
            return Ok(StartupOutcome::Expired);
        }

        self.lifecycle.attach_all()?;
        Ok(StartupOutcome::Started)
    }

    async fn shutdown(&self, reason: Reason) -> Result<()> {
        info!(%reason, "Shutting down study");
        if let Err(e) = self.lifecycle.stop_listening() {
            warn!(error = %e, "Failed to unsubscribe from surface events");
        }
        let had_element = self.lifecycle.teardown_all();

        if !reason.is_terminal() {
            return Ok(());
        }

        self.reset_persisted()?;
        let counters = self.host.counters().snapshot().unwrap_or_else(|e| {
            warn!(error = %e, "Host counters unavailable");
            BTreeMap::new()
        });
        let report = SummaryReporter::new(self.host.telemetry(), self.log.as_ref())
            .report(had_element, &counters)
            .await;

        if !self.ending.swap(true, Ordering::SeqCst) {
            self.send_state(StudyState::UserDisable).await;
        }
        report.map(|_| ())
    }

    async fn handle_event(&self, event: HostEvent) {
        let id = event.surface();
        let kind = event.kind();
        if event.is_lifecycle() && !self.lifecycle.is_listening() {
            debug!(surface = %id, kind, "Ignoring surface event while not listening");
            return;
        }

        let result = match event {
            HostEvent::SurfaceReady { surface } => {
                self.lifecycle.surface_ready(surface);
                Ok(())
            }
            HostEvent::SurfaceClosing { surface } => {
                self.lifecycle.teardown(surface);
                Ok(())
            }
            HostEvent::LayoutReset { surface } => self.lifecycle.layout_reset(surface).map(|_| ()),
            HostEvent::Copy { surface, context } => self.on_copy(surface, &context).await,
            HostEvent::OfferAccepted { surface } => self.on_offer_accepted(surface).await,
            HostEvent::HighlightEnded { surface } => self.on_highlight_ended(surface),
        };

        if let Err(e) = result {
            warn!(surface = %id, kind, error = %e, "Event handling failed");
        }
    }
}

impl fmt::Debug for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Study")
            .field("study_name", &self.config.study_name)
            .field("treatment", &self.treatment())
            .field("ending", &self.is_ending())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studykit_host::{EligibilityCheck, InMemoryBrowser, MemoryKv, PersistentKv};

    fn study(browser: &Arc<InMemoryBrowser>, prefs: &Arc<MemoryKv>) -> Study {
        let host = HostContext::from_browser(browser.clone(), prefs.clone());
        Study::new(StudyConfig::default(), host, Arc::new(InMemoryPingLog::new())).unwrap()
    }

    fn states(browser: &InMemoryBrowser) -> Vec<String> {
        browser
            .sent()
            .iter()
            .filter_map(|p| p.get("study_state").map(str::to_string))
            .collect()
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let browser = Arc::new(InMemoryBrowser::new("c"));
        let host = HostContext::from_browser(browser, Arc::new(MemoryKv::new()));
        let config = StudyConfig {
            weighted_variations: vec![],
            ..StudyConfig::default()
        };
        let err = Study::new(config, host, Arc::new(InMemoryPingLog::new())).unwrap_err();
        assert!(matches!(err, StudyError::Config(_)));
    }

    #[tokio::test]
    async fn install_startup_sends_enter_and_installed() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        let prefs = Arc::new(MemoryKv::new());
        let study = study(&browser, &prefs);

        assert_eq!(
            study.startup(Reason::Install).await.unwrap(),
            StartupOutcome::Started
        );
        assert_eq!(states(&browser), vec!["enter", "installed"]);
        assert!(study.assignment().is_some());
        assert!(study.expiration().unwrap().is_some());
        assert!(browser.is_subscribed());
    }

    #[tokio::test]
    async fn expiration_set_once() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        let prefs = Arc::new(MemoryKv::new());
        let study = study(&browser, &prefs);
        study.startup(Reason::AppStartup).await.unwrap();
        let first = study.expiration().unwrap().unwrap();

        let expected = Utc::now() + Duration::days(14);
        assert!((expected - first).num_seconds().abs() < 60);

        let again = self::study(&browser, &prefs);
        again.startup(Reason::AppStartup).await.unwrap();
        assert_eq!(again.expiration().unwrap(), Some(first));
    }

    #[tokio::test]
    async fn past_expiration_ends_study() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        browser.open_window(SurfaceId(1));
        let prefs = Arc::new(MemoryKv::new());
        let past = (Utc::now() - Duration::days(1)).to_rfc3339();
        prefs
            .set(
                &StudyConfig::default().pref_keys().expiration,
                past.into(),
            )
            .unwrap();

        let study = study(&browser, &prefs);
        assert_eq!(
            study.startup(Reason::AppStartup).await.unwrap(),
            StartupOutcome::Expired
        );
        assert!(study.is_ending());
        assert_eq!(states(&browser), vec!["active", "expired"]);
        assert!(study.lifecycle().is_empty());
        assert!(!browser.is_subscribed());

        // Uninstall after expiry does not claim the user disabled it
        study.shutdown(Reason::Uninstall).await.unwrap();
        assert_eq!(states(&browser), vec!["active", "expired"]);
    }

    struct Ineligible;

    #[async_trait]
    impl EligibilityCheck for Ineligible {
        async fn is_eligible(&self) -> studykit_host::Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn ineligible_install_ends_before_wiring() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        browser.open_window(SurfaceId(1));
        let prefs = Arc::new(MemoryKv::new());
        let host = HostContext::from_browser(browser.clone(), prefs.clone())
            .with_eligibility(Arc::new(Ineligible));
        let study =
            Study::new(StudyConfig::default(), host, Arc::new(InMemoryPingLog::new())).unwrap();

        assert_eq!(
            study.startup(Reason::Install).await.unwrap(),
            StartupOutcome::Ineligible
        );
        assert!(study.is_ending());
        assert_eq!(states(&browser), vec!["enter", "ineligible"]);
        assert!(study.lifecycle().is_empty());
        assert!(!browser.is_subscribed());
        assert!(browser.window(SurfaceId(1)).unwrap().is_pristine());

        study.shutdown(Reason::Uninstall).await.unwrap();
        assert_eq!(states(&browser), vec!["enter", "ineligible"]);
    }

    #[tokio::test]
    async fn eligibility_only_checked_on_install() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        let host = HostContext::from_browser(browser.clone(), Arc::new(MemoryKv::new()))
            .with_eligibility(Arc::new(Ineligible));
        let study =
            Study::new(StudyConfig::default(), host, Arc::new(InMemoryPingLog::new())).unwrap();

        assert_eq!(
            study.startup(Reason::AppStartup).await.unwrap(),
            StartupOutcome::Started
        );
        assert_eq!(states(&browser), vec!["active"]);
    }

    #[tokio::test]
    async fn lifecycle_events_ignored_after_shutdown() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        let prefs = Arc::new(MemoryKv::new());
        let study = study(&browser, &prefs);
        study.startup(Reason::AppStartup).await.unwrap();
        study.shutdown(Reason::AppShutdown).await.unwrap();

        browser.open_window(SurfaceId(4));
        study
            .handle_event(HostEvent::SurfaceReady {
                surface: SurfaceId(4),
            })
            .await;
        assert!(study.lifecycle().is_empty());
        assert!(browser.window(SurfaceId(4)).unwrap().is_pristine());
    }

    #[tokio::test]
    async fn copy_before_startup_is_ignored() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        let prefs = Arc::new(MemoryKv::new());
        let study = study(&browser, &prefs);

        study
            .handle_event(HostEvent::Copy {
                surface: SurfaceId(1),
                context: TriggerContext::copy("https://example.com/"),
            })
            .await;
        assert!(browser.sent().is_empty());
    }
}
