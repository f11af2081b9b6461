//! In-memory browser for tests and simulations.
//!
//! Implements every UI capability against plain data so a study can be driven
//! end to end without a real browser. Effects are recorded in order and the
//! window/element state is inspectable afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::capability::{
    ElementQuery, HostCounters, InstallAction, SurfaceEvents, SurfaceUi, TelemetrySink,
};
use crate::error::{HostError, Result};
use crate::types::{AreaLocation, ElementState, PanelKind, PingRecord, SurfaceId, TargetArea};

/// Anchor id every fake window exposes unless told otherwise.
pub const DEFAULT_MENU_ANCHOR: &str = "PanelUI-menu-button";

/// One UI effect the browser performed, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    TriggerInstalled(SurfaceId),
    TriggerRemoved(SurfaceId),
    StylesInjected(SurfaceId),
    StylesRemoved(SurfaceId),
    HookAdded(SurfaceId),
    HookRemoved(SurfaceId),
    Highlight { surface: SurfaceId, on: bool },
    PanelOpened {
        surface: SurfaceId,
        panel: PanelKind,
        anchor: String,
    },
    PanelClosed { surface: SurfaceId, panel: PanelKind },
    PanelRemoved { surface: SurfaceId, panel: PanelKind },
    ElementInstalled { element: String, area: TargetArea },
}

impl fmt::Display for UiEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerInstalled(s) => write!(f, "{s}: trigger installed"),
            Self::TriggerRemoved(s) => write!(f, "{s}: trigger removed"),
            Self::StylesInjected(s) => write!(f, "{s}: styles injected"),
            Self::StylesRemoved(s) => write!(f, "{s}: styles removed"),
            Self::HookAdded(s) => write!(f, "{s}: layout-reset hook added"),
            Self::HookRemoved(s) => write!(f, "{s}: layout-reset hook removed"),
            Self::Highlight { surface, on: true } => write!(f, "{surface}: highlight on"),
            Self::Highlight { surface, on: false } => write!(f, "{surface}: highlight off"),
            Self::PanelOpened {
                surface,
                panel,
                anchor,
            } => write!(f, "{surface}: {panel} opened at {anchor}"),
            Self::PanelClosed { surface, panel } => write!(f, "{surface}: {panel} closed"),
            Self::PanelRemoved { surface, panel } => write!(f, "{surface}: {panel} removed"),
            Self::ElementInstalled { element, area } => write!(f, "{element} installed in {area}"),
        }
    }
}

/// State of one fake window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeWindow {
    pub has_url_bar: bool,
    pub trigger_installed: bool,
    pub styles_injected: bool,
    pub reset_hook: bool,
    pub highlighted: bool,
    pub menu_anchor: bool,
    /// Panels created in this window (open or hidden)
    pub panels: BTreeSet<PanelKind>,
    /// Panels currently shown
    pub open_panels: BTreeSet<PanelKind>,
}

impl FakeWindow {
    fn browser_window() -> Self {
        Self {
            has_url_bar: true,
            trigger_installed: false,
            styles_injected: false,
            reset_hook: false,
            highlighted: false,
            menu_anchor: true,
            panels: BTreeSet::new(),
            open_panels: BTreeSet::new(),
        }
    }

    /// Whether anything the study installs is still present.
    pub fn is_pristine(&self) -> bool {
        !self.trigger_installed
            && !self.styles_injected
            && !self.reset_hook
            && !self.highlighted
            && self.panels.is_empty()
    }
}

#[derive(Debug)]
struct BrowserState {
    identity: String,
    windows: BTreeMap<SurfaceId, FakeWindow>,
    subscribed: bool,
    /// Where the tracked element is placed, `None` when not in any area
    element_location: Option<AreaLocation>,
    element_disabled: bool,
    effects: Vec<UiEffect>,
    sent: Vec<PingRecord>,
    installs: Vec<(String, TargetArea)>,
    counters: BTreeMap<String, i64>,
    fail_ui: bool,
}

/// Scriptable in-memory browser.
pub struct InMemoryBrowser {
    state: Mutex<BrowserState>,
    telemetry_gate: Mutex<Option<Arc<Semaphore>>>,
    pending_sends: AtomicUsize,
}

impl InMemoryBrowser {
    /// A browser with no windows whose telemetry identity is `identity`.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(BrowserState {
                identity: identity.into(),
                windows: BTreeMap::new(),
                subscribed: false,
                element_location: None,
                element_disabled: false,
                effects: Vec::new(),
                sent: Vec::new(),
                installs: Vec::new(),
                counters: BTreeMap::new(),
                fail_ui: false,
            }),
            telemetry_gate: Mutex::new(None),
            pending_sends: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Scripting ──────────────────────────────────────────────────

    /// Open a regular browser window (with an address bar).
    pub fn open_window(&self, id: SurfaceId) {
        self.state().windows.insert(id, FakeWindow::browser_window());
    }

    /// Open a window without an address bar (browser console, dev tools).
    pub fn open_console_window(&self, id: SurfaceId) {
        let mut window = FakeWindow::browser_window();
        window.has_url_bar = false;
        window.menu_anchor = false;
        self.state().windows.insert(id, window);
    }

    /// Close a window. Its state is dropped.
    pub fn close_window(&self, id: SurfaceId) -> Option<FakeWindow> {
        self.state().windows.remove(&id)
    }

    /// Simulate a toolbar customization: the toolbar is rebuilt and any
    /// installed interception is dropped.
    pub fn reset_layout(&self, id: SurfaceId) {
        if let Some(window) = self.state().windows.get_mut(&id) {
            window.trigger_installed = false;
        }
    }

    /// Place the element somewhere, or remove it with `None`.
    pub fn place_element(&self, location: Option<AreaLocation>) {
        self.state().element_location = location;
    }

    /// Mark the element disabled (the current page cannot be shared).
    pub fn set_element_disabled(&self, disabled: bool) {
        self.state().element_disabled = disabled;
    }

    /// Remove the menu anchor from a window.
    pub fn remove_menu_anchor(&self, id: SurfaceId) {
        if let Some(window) = self.state().windows.get_mut(&id) {
            window.menu_anchor = false;
        }
    }

    /// Set a host counter.
    pub fn set_counter(&self, name: impl Into<String>, value: i64) {
        self.state().counters.insert(name.into(), value);
    }

    /// Make every UI effect fail with [`HostError::Unavailable`].
    pub fn fail_ui(&self, fail: bool) {
        self.state().fail_ui = fail;
    }

    /// Park every telemetry send until [`release_telemetry`](Self::release_telemetry).
    pub fn hold_telemetry(&self) {
        *self
            .telemetry_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let parked and future sends through.
    pub fn release_telemetry(&self) {
        let gate = self
            .telemetry_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            gate.close();
        }
    }

    /// Sends currently parked on the telemetry gate.
    pub fn pending_sends(&self) -> usize {
        self.pending_sends.load(Ordering::SeqCst)
    }

    // ─── Inspection ─────────────────────────────────────────────────

    pub fn window(&self, id: SurfaceId) -> Option<FakeWindow> {
        self.state().windows.get(&id).cloned()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state().subscribed
    }

    pub fn effects(&self) -> Vec<UiEffect> {
        self.state().effects.clone()
    }

    /// Count effects matching a predicate.
    pub fn count_effects(&self, pred: impl Fn(&UiEffect) -> bool) -> usize {
        self.state().effects.iter().filter(|e| pred(e)).count()
    }

    /// Every record delivered through the telemetry sink.
    pub fn sent(&self) -> Vec<PingRecord> {
        self.state().sent.clone()
    }

    pub fn installs(&self) -> Vec<(String, TargetArea)> {
        self.state().installs.clone()
    }

    pub fn element_location(&self) -> Option<AreaLocation> {
        self.state().element_location
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn with_window<T>(
        &self,
        id: SurfaceId,
        f: impl FnOnce(&mut FakeWindow, &mut Vec<UiEffect>) -> T,
    ) -> Result<T> {
        let mut state = self.state();
        if state.fail_ui {
            return Err(HostError::unavailable(format!("{id}: ui calls failing")));
        }
        let BrowserState {
            windows, effects, ..
        } = &mut *state;
        let window = windows
            .get_mut(&id)
            .ok_or_else(|| HostError::unavailable(format!("{id} is closed")))?;
        Ok(f(window, effects))
    }
}

impl fmt::Debug for InMemoryBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("InMemoryBrowser")
            .field("windows", &state.windows.len())
            .field("subscribed", &state.subscribed)
            .field("sent", &state.sent.len())
            .finish()
    }
}

impl ElementQuery for InMemoryBrowser {
    fn usability_state(&self, surface: SurfaceId, element_id: &str) -> Result<ElementState> {
        let state = self.state();
        let window = state
            .windows
            .get(&surface)
            .ok_or_else(|| HostError::unavailable(format!("{surface} is closed")))?;

        if element_id == DEFAULT_MENU_ANCHOR {
            return Ok(if window.menu_anchor {
                ElementState::placed(AreaLocation::Toolbar)
            } else {
                ElementState::absent()
            });
        }

        Ok(match state.element_location {
            Some(location) => ElementState {
                present: true,
                disabled: state.element_disabled,
                location,
            },
            None => ElementState::absent(),
        })
    }
}

impl SurfaceEvents for InMemoryBrowser {
    fn open_surfaces(&self) -> Vec<SurfaceId> {
        self.state().windows.keys().copied().collect()
    }

    fn subscribe(&self) -> Result<()> {
        self.state().subscribed = true;
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        self.state().subscribed = false;
        Ok(())
    }
}

impl SurfaceUi for InMemoryBrowser {
    fn has_trigger_region(&self, surface: SurfaceId) -> Result<bool> {
        self.state()
            .windows
            .get(&surface)
            .map(|w| w.has_url_bar)
            .ok_or_else(|| HostError::unavailable(format!("{surface} is closed")))
    }

    fn install_trigger(&self, surface: SurfaceId) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.trigger_installed = true;
            fx.push(UiEffect::TriggerInstalled(surface));
        })
    }

    fn remove_trigger(&self, surface: SurfaceId) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.trigger_installed = false;
            fx.push(UiEffect::TriggerRemoved(surface));
        })
    }

    fn inject_styles(&self, surface: SurfaceId) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.styles_injected = true;
            fx.push(UiEffect::StylesInjected(surface));
        })
    }

    fn remove_styles(&self, surface: SurfaceId) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.styles_injected = false;
            fx.push(UiEffect::StylesRemoved(surface));
        })
    }

    fn add_layout_reset_hook(&self, surface: SurfaceId) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.reset_hook = true;
            fx.push(UiEffect::HookAdded(surface));
        })
    }

    fn remove_layout_reset_hook(&self, surface: SurfaceId) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.reset_hook = false;
            fx.push(UiEffect::HookRemoved(surface));
        })
    }

    fn set_highlight(&self, surface: SurfaceId, _element_id: &str, on: bool) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.highlighted = on;
            fx.push(UiEffect::Highlight { surface, on });
        })
    }

    fn open_panel(&self, surface: SurfaceId, panel: PanelKind, anchor_id: &str) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.panels.insert(panel);
            w.open_panels.insert(panel);
            fx.push(UiEffect::PanelOpened {
                surface,
                panel,
                anchor: anchor_id.to_string(),
            });
        })
    }

    fn close_panel(&self, surface: SurfaceId, panel: PanelKind) -> Result<()> {
        self.with_window(surface, |w, fx| {
            if w.open_panels.remove(&panel) {
                fx.push(UiEffect::PanelClosed { surface, panel });
            }
        })
    }

    fn remove_panel(&self, surface: SurfaceId, panel: PanelKind) -> Result<()> {
        self.with_window(surface, |w, fx| {
            w.open_panels.remove(&panel);
            if w.panels.remove(&panel) {
                fx.push(UiEffect::PanelRemoved { surface, panel });
            }
        })
    }
}

impl InstallAction for InMemoryBrowser {
    fn install(&self, element_id: &str, area: TargetArea) -> Result<()> {
        let mut state = self.state();
        state.element_location = Some(AreaLocation::Toolbar);
        state.installs.push((element_id.to_string(), area));
        state.effects.push(UiEffect::ElementInstalled {
            element: element_id.to_string(),
            area,
        });
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for InMemoryBrowser {
    async fn send(&self, record: &PingRecord) -> Result<()> {
        let gate = self
            .telemetry_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            self.pending_sends.fetch_add(1, Ordering::SeqCst);
            // A closed semaphore is the release signal.
            let _ = gate.acquire().await;
            self.pending_sends.fetch_sub(1, Ordering::SeqCst);
        }
        self.state().sent.push(record.clone());
        Ok(())
    }

    async fn stable_identity(&self) -> Result<String> {
        Ok(self.state().identity.clone())
    }
}

impl HostCounters for InMemoryBrowser {
    fn snapshot(&self) -> Result<BTreeMap<String, i64>> {
        Ok(self.state().counters.clone())
    }
}
