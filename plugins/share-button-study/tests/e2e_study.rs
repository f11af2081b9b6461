//! End-to-end tests for the share button study.
//!
//! These drive a [`Study`] through the host bootstrap lifecycle against the
//! in-memory browser, the way a real browser would: startup, window events,
//! copy triggers, shutdown.
//!
//! ## Scenarios
//!
//! - Offer-to-install: offer once, install once, then notify
//! - Show cap across many copies
//! - Window closed while a treatment is suspended
//! - Summary on uninstall, nothing on ordinary shutdown
//! - Restart resumes assignment, counter and log

use std::sync::Arc;

use share_button_study::{
    COPIES_FIELD, HAS_ELEMENT_FIELD, InMemoryPingLog, JsonlPingLog, PingLog, PrefKeys,
    SUMMARY_FIELD, Study, StudyConfig, Treatment, filter_first_match,
};
use studykit_host::{
    AreaLocation, Bootstrap, HostContext, HostEvent, InMemoryBrowser, MemoryKv, PanelKind,
    PersistentKv, PingRecord, Reason, SurfaceId, TargetArea, TomlKv, TriggerContext, UiEffect,
};
use tempfile::TempDir;

const URL: &str = "https://www.mozilla.org/en-US/firefox/";
const WINDOW: SurfaceId = SurfaceId(1);

/// Test harness: one browser, one study, shared preferences.
struct Harness {
    browser: Arc<InMemoryBrowser>,
    prefs: Arc<dyn PersistentKv>,
    study: Arc<Study>,
    keys: PrefKeys,
}

impl Harness {
    /// In-memory everything, with `treatment` forced through the override.
    fn new(treatment: Treatment, config: StudyConfig) -> Self {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        browser.open_window(WINDOW);
        let prefs: Arc<dyn PersistentKv> = Arc::new(MemoryKv::new());
        Self::build(browser, prefs, treatment, config, Arc::new(InMemoryPingLog::new()))
    }

    fn build(
        browser: Arc<InMemoryBrowser>,
        prefs: Arc<dyn PersistentKv>,
        treatment: Treatment,
        config: StudyConfig,
        log: Arc<dyn PingLog>,
    ) -> Self {
        let keys = config.pref_keys();
        prefs
            .set(&keys.treatment, treatment.as_str().into())
            .unwrap();
        let host = HostContext::from_browser(browser.clone(), prefs.clone());
        let study = Arc::new(Study::new(config, host, log).unwrap());
        Self {
            browser,
            prefs,
            study,
            keys,
        }
    }

    async fn copy(&self, url: &str) {
        self.study
            .handle_event(HostEvent::Copy {
                surface: WINDOW,
                context: TriggerContext::copy(url),
            })
            .await;
    }

    fn count(&self) -> i64 {
        self.prefs.get_int(&self.keys.counter, 0).unwrap()
    }

    fn added(&self) -> bool {
        self.prefs.get_bool(&self.keys.added, false).unwrap()
    }

    fn treatment_pings(&self, name: &str) -> usize {
        self.browser
            .sent()
            .iter()
            .filter(|p| p.is_treatment(name))
            .count()
    }

    fn states(&self) -> Vec<String> {
        self.browser
            .sent()
            .iter()
            .filter_map(|p| p.get("study_state").map(str::to_string))
            .collect()
    }
}

// ─── Offer To Install ────────────────────────────────────────────────

#[tokio::test]
async fn offer_to_install_offers_once_installs_once_then_notifies() {
    let h = Harness::new(Treatment::OfferToInstall, StudyConfig::default());
    h.study.startup(Reason::Install).await.unwrap();

    // Element absent, page shareable: the offer opens at the menu button
    h.copy(URL).await;
    assert_eq!(h.treatment_pings("ask-to-add"), 1);
    assert!(h.browser.window(WINDOW).unwrap().open_panels.contains(&PanelKind::Offer));
    assert!(!h.added());

    h.study
        .handle_event(HostEvent::OfferAccepted { surface: WINDOW })
        .await;
    assert_eq!(
        h.browser.installs(),
        vec![("social-share-button".to_string(), TargetArea::NavBar)]
    );
    assert!(h.added());
    assert_eq!(h.treatment_pings("highlight"), 1);

    // Second trigger: no new offer, the passive-notify branch instead
    h.copy(URL).await;
    assert_eq!(h.treatment_pings("ask-to-add"), 1);
    assert_eq!(h.treatment_pings("doorhanger"), 1);
    assert_eq!(h.browser.installs().len(), 1);
    assert_eq!(h.count(), 2);

    let records = h.study.ping_log().all().await.unwrap();
    let is_copy = |r: &PingRecord| r.is_event("copy");
    let is_offer = |r: &PingRecord| r.is_treatment("ask-to-add");
    let is_notify = |r: &PingRecord| r.is_treatment("doorhanger");
    assert!(filter_first_match(&records, &[&is_copy, &is_offer, &is_copy, &is_notify]).is_ok());
}

// ─── Show Cap ────────────────────────────────────────────────────────

#[tokio::test]
async fn show_cap_bounds_treatments_but_not_copy_pings() {
    let h = Harness::new(Treatment::Highlight, StudyConfig::default());
    h.browser.place_element(Some(AreaLocation::Toolbar));
    h.study.startup(Reason::Install).await.unwrap();

    for _ in 0..8 {
        h.copy(URL).await;
        h.study
            .handle_event(HostEvent::HighlightEnded { surface: WINDOW })
            .await;
    }

    assert_eq!(h.treatment_pings("highlight"), 5);
    assert_eq!(
        h.browser
            .count_effects(|e| matches!(e, UiEffect::Highlight { on: true, .. })),
        5
    );
    let copies = h.browser.sent().iter().filter(|p| p.is_event("copy")).count();
    assert_eq!(copies, 8);
    assert_eq!(h.count(), 5);
}

#[tokio::test]
async fn cap_holds_across_treatments_sharing_the_counter() {
    let config = StudyConfig {
        max_times_to_show: 1,
        ..StudyConfig::default()
    };
    let h = Harness::new(Treatment::AutoInstall, config);
    h.study.startup(Reason::Install).await.unwrap();

    h.copy(URL).await;
    h.copy(URL).await;

    // Install plus notification counted once; the second copy is throttled
    assert_eq!(h.treatment_pings("add-to-toolbar"), 1);
    assert_eq!(h.treatment_pings("doorhanger"), 1);
    assert_eq!(h.count(), 1);
}

// ─── Teardown Races ──────────────────────────────────────────────────

#[tokio::test]
async fn window_closed_during_suspended_treatment_is_abandoned() {
    let h = Harness::new(Treatment::PassiveNotify, StudyConfig::default());
    h.browser.place_element(Some(AreaLocation::Toolbar));
    h.study.startup(Reason::AppStartup).await.unwrap();
    h.browser.hold_telemetry();

    let task = {
        let study = h.study.clone();
        tokio::spawn(async move {
            study
                .handle_event(HostEvent::Copy {
                    surface: WINDOW,
                    context: TriggerContext::copy(URL),
                })
                .await;
        })
    };
    while h.browser.pending_sends() == 0 {
        tokio::task::yield_now().await;
    }

    h.study
        .handle_event(HostEvent::SurfaceClosing { surface: WINDOW })
        .await;
    h.browser.release_telemetry();
    task.await.unwrap();

    assert_eq!(h.count(), 0);
    assert_eq!(h.treatment_pings("doorhanger"), 0);
    assert_eq!(
        h.browser
            .count_effects(|e| matches!(e, UiEffect::PanelOpened { .. })),
        0
    );
    assert!(h.browser.window(WINDOW).unwrap().is_pristine());
    assert!(h.study.lifecycle().is_empty());
}

#[tokio::test]
async fn closing_twice_is_closing_once() {
    let h = Harness::new(Treatment::Control, StudyConfig::default());
    h.study.startup(Reason::AppStartup).await.unwrap();

    h.study
        .handle_event(HostEvent::SurfaceClosing { surface: WINDOW })
        .await;
    let effects = h.browser.effects();
    h.study
        .handle_event(HostEvent::SurfaceClosing { surface: WINDOW })
        .await;
    assert_eq!(h.browser.effects(), effects);
}

#[tokio::test]
async fn new_window_and_layout_reset_are_wired() {
    let h = Harness::new(Treatment::Control, StudyConfig::default());
    h.study.startup(Reason::AppStartup).await.unwrap();

    h.browser.open_window(SurfaceId(2));
    h.study
        .handle_event(HostEvent::SurfaceReady {
            surface: SurfaceId(2),
        })
        .await;
    assert!(h.browser.window(SurfaceId(2)).unwrap().trigger_installed);

    h.browser.reset_layout(SurfaceId(2));
    h.study
        .handle_event(HostEvent::LayoutReset {
            surface: SurfaceId(2),
        })
        .await;
    assert!(h.browser.window(SurfaceId(2)).unwrap().trigger_installed);
}

// ─── Shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn uninstall_sends_summary_and_resets_state() {
    let h = Harness::new(Treatment::Highlight, StudyConfig::default());
    h.browser.place_element(Some(AreaLocation::Toolbar));
    h.browser.set_counter("numberOfShareButtonClicks", 2);
    h.browser.set_counter("numberOfSharePanelClicks", 1);
    h.study.startup(Reason::Install).await.unwrap();

    h.copy(URL).await;
    h.browser.set_element_disabled(true);
    h.copy("about:home").await;

    h.study.shutdown(Reason::Uninstall).await.unwrap();

    let sent = h.browser.sent();
    let summary = sent
        .iter()
        .find(|p| p.get(SUMMARY_FIELD).is_some())
        .expect("summary sent");
    assert_eq!(summary.get(HAS_ELEMENT_FIELD), Some("true"));
    assert_eq!(summary.get(COPIES_FIELD), Some("2"));
    assert_eq!(summary.get("numberOfShareButtonClicks"), Some("2"));
    assert_eq!(summary.get("numberOfSharePanelClicks"), Some("1"));

    let embedded: Vec<PingRecord> =
        serde_json::from_str(summary.get(SUMMARY_FIELD).unwrap()).unwrap();
    assert_eq!(
        embedded,
        vec![
            PingRecord::event("copy"),
            PingRecord::treatment("highlight"),
            PingRecord::event("copy"),
        ]
    );

    assert_eq!(h.states(), vec!["enter", "installed", "user-disable"]);
    assert_eq!(
        sent.last().and_then(|p| p.get("study_state")),
        Some("user-disable")
    );
    assert!(!h.prefs.has(&h.keys.counter).unwrap());
    assert!(!h.prefs.has(&h.keys.added).unwrap());
    assert!(h.study.ping_log().all().await.is_err());
    assert!(h.browser.window(WINDOW).unwrap().is_pristine());
    assert!(!h.browser.is_subscribed());
}

#[tokio::test]
async fn ordinary_shutdown_leaves_state_untouched() {
    let h = Harness::new(Treatment::Highlight, StudyConfig::default());
    h.browser.place_element(Some(AreaLocation::Toolbar));
    h.study.startup(Reason::Install).await.unwrap();
    h.copy(URL).await;

    h.study.shutdown(Reason::AppShutdown).await.unwrap();

    assert_eq!(h.count(), 1);
    assert_eq!(h.study.ping_log().all().await.unwrap().len(), 2);
    assert!(h
        .browser
        .sent()
        .iter()
        .all(|p| p.get(SUMMARY_FIELD).is_none()));
    assert_eq!(h.states(), vec!["enter", "installed"]);
    assert!(h.browser.window(WINDOW).unwrap().is_pristine());
}

// ─── Restart ─────────────────────────────────────────────────────────

#[tokio::test]
async fn restart_resumes_assignment_counter_and_log() {
    let dir = TempDir::new().unwrap();
    let prefs_path = dir.path().join("prefs.toml");
    let log_path = dir.path().join("pings.jsonl");
    let browser = Arc::new(InMemoryBrowser::new("client-1"));
    browser.open_window(WINDOW);
    browser.place_element(Some(AreaLocation::Toolbar));

    let first_assignment = {
        let h = Harness::build(
            browser.clone(),
            Arc::new(TomlKv::open(&prefs_path).unwrap()),
            Treatment::PassiveNotify,
            StudyConfig::default(),
            Arc::new(JsonlPingLog::new(&log_path)),
        );
        h.study.startup(Reason::Install).await.unwrap();
        h.copy(URL).await;
        h.copy(URL).await;
        h.study.shutdown(Reason::AppShutdown).await.unwrap();
        h.study.assignment().cloned().unwrap()
    };

    let h = Harness::build(
        browser.clone(),
        Arc::new(TomlKv::open(&prefs_path).unwrap()),
        Treatment::PassiveNotify,
        StudyConfig::default(),
        Arc::new(JsonlPingLog::new(&log_path)),
    );
    h.study.startup(Reason::AppStartup).await.unwrap();

    assert_eq!(h.study.assignment(), Some(&first_assignment));
    assert_eq!(h.count(), 2);
    assert_eq!(h.study.ping_log().all().await.unwrap().len(), 4);

    h.copy(URL).await;
    assert_eq!(h.count(), 3);
    assert_eq!(h.study.ping_log().all().await.unwrap().len(), 6);
}

#[tokio::test]
async fn sampled_assignment_is_stable_across_restarts() {
    let browser = Arc::new(InMemoryBrowser::new("client-abc"));
    let prefs: Arc<dyn PersistentKv> = Arc::new(MemoryKv::new());

    let mut assignments = Vec::new();
    for _ in 0..3 {
        let host = HostContext::from_browser(browser.clone(), prefs.clone());
        let study = Study::new(
            StudyConfig::default(),
            host,
            Arc::new(InMemoryPingLog::new()),
        )
        .unwrap();
        study.startup(Reason::AppStartup).await.unwrap();
        assignments.push(study.assignment().cloned().unwrap());
        study.shutdown(Reason::AppShutdown).await.unwrap();
    }

    assert!(assignments.windows(2).all(|w| w[0] == w[1]));
}
