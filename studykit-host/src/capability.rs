//! Host capabilities - the narrow interfaces a study calls into the browser through

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HostError, Result};
use crate::prefs::PrefValue;
use crate::types::{ElementState, PanelKind, PingRecord, SurfaceId, TargetArea};

// ─── Storage ─────────────────────────────────────────────────────────

/// Durable preference-like key-value storage that outlives a process run.
///
/// Reads and writes are synchronous: callers rely on a `set` having landed
/// before they reach their next suspension point.
pub trait PersistentKv: Send + Sync {
    /// Read a raw value
    fn get(&self, key: &str) -> Result<Option<PrefValue>>;

    /// Write a value
    fn set(&self, key: &str, value: PrefValue) -> Result<()>;

    /// Remove a value so later reads fall back to their default
    fn reset(&self, key: &str) -> Result<()>;

    /// Whether a value is set
    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Read an integer, `default` when unset
    fn get_int(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key)? {
            None => Ok(default),
            Some(PrefValue::Int(i)) => Ok(i),
            Some(other) => Err(mismatch(key, "int", &other)),
        }
    }

    /// Read a boolean, `default` when unset
    fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key)? {
            None => Ok(default),
            Some(PrefValue::Bool(b)) => Ok(b),
            Some(other) => Err(mismatch(key, "bool", &other)),
        }
    }

    /// Read a string; there is no default for strings
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key)? {
            None => Ok(None),
            Some(PrefValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(key, "string", &other)),
        }
    }
}

fn mismatch(key: &str, expected: &str, found: &PrefValue) -> HostError {
    HostError::storage(format!(
        "preference {key}: expected {expected}, found {}",
        found.type_name()
    ))
}

// ─── UI Queries & Effects ────────────────────────────────────────────

/// Looks up a toolbar element inside a surface.
pub trait ElementQuery: Send + Sync {
    /// Current state of `element_id` in `surface`. Fails with
    /// [`HostError::Unavailable`] when the surface no longer exists.
    fn usability_state(&self, surface: SurfaceId, element_id: &str) -> Result<ElementState>;
}

/// Host-reported surface lifecycle.
///
/// While subscribed, the host forwards surface-ready, surface-closing and
/// layout-reset events to the study's event handler.
pub trait SurfaceEvents: Send + Sync {
    /// Surfaces open right now, in host order
    fn open_surfaces(&self) -> Vec<SurfaceId>;

    /// Start forwarding surface events
    fn subscribe(&self) -> Result<()>;

    /// Stop forwarding surface events
    fn unsubscribe(&self) -> Result<()>;
}

/// Per-surface UI state a study installs and later removes.
pub trait SurfaceUi: Send + Sync {
    /// Whether the surface has an addressable input region to intercept
    /// (an address bar). Consoles and dev tools windows do not.
    fn has_trigger_region(&self, surface: SurfaceId) -> Result<bool>;

    /// Start intercepting clipboard commands on the address bar
    fn install_trigger(&self, surface: SurfaceId) -> Result<()>;

    /// Stop intercepting clipboard commands
    fn remove_trigger(&self, surface: SurfaceId) -> Result<()>;

    /// Load the study's stylesheets
    fn inject_styles(&self, surface: SurfaceId) -> Result<()>;

    /// Unload the study's stylesheets
    fn remove_styles(&self, surface: SurfaceId) -> Result<()>;

    /// Ask to be told when a toolbar customization ends. Customization
    /// rebuilds the toolbar and silently drops installed interception.
    fn add_layout_reset_hook(&self, surface: SurfaceId) -> Result<()>;

    /// Stop listening for customization end
    fn remove_layout_reset_hook(&self, surface: SurfaceId) -> Result<()>;

    /// Toggle the transient emphasis animation on an element
    fn set_highlight(&self, surface: SurfaceId, element_id: &str, on: bool) -> Result<()>;

    /// Open (creating on first use) a panel anchored to `anchor_id`
    fn open_panel(&self, surface: SurfaceId, panel: PanelKind, anchor_id: &str) -> Result<()>;

    /// Hide an open panel, keeping it for reuse
    fn close_panel(&self, surface: SurfaceId, panel: PanelKind) -> Result<()>;

    /// Remove a panel from the surface entirely. No-op if it was never created.
    fn remove_panel(&self, surface: SurfaceId, panel: PanelKind) -> Result<()>;
}

/// Places a UI element. Idempotent in intent: installing an element that is
/// already placed leaves it where it is.
pub trait InstallAction: Send + Sync {
    fn install(&self, element_id: &str, area: TargetArea) -> Result<()>;
}

// ─── Telemetry ───────────────────────────────────────────────────────

/// Outbound telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver one record
    async fn send(&self, record: &PingRecord) -> Result<()>;

    /// Stable client identity, identical across restarts
    async fn stable_identity(&self) -> Result<String>;
}

/// Counters the host keeps on its own (button clicks, panel clicks).
pub trait HostCounters: Send + Sync {
    fn snapshot(&self) -> Result<BTreeMap<String, i64>>;
}

/// A host with no counters of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCounters;

impl HostCounters for NoCounters {
    fn snapshot(&self) -> Result<BTreeMap<String, i64>> {
        Ok(BTreeMap::new())
    }
}

// ─── Eligibility ─────────────────────────────────────────────────────

/// Client-side enrollment check run once, on install.
///
/// Covers what the enrollment server cannot see, such as a user who already
/// placed the element or toggled related UI.
#[async_trait]
pub trait EligibilityCheck: Send + Sync {
    async fn is_eligible(&self) -> Result<bool>;
}

/// Every client is eligible.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysEligible;

#[async_trait]
impl EligibilityCheck for AlwaysEligible {
    async fn is_eligible(&self) -> Result<bool> {
        Ok(true)
    }
}

// ─── Host Context ────────────────────────────────────────────────────

/// Everything a host provides, bundled for the study.
///
/// Each capability sits behind its own `Arc<dyn ...>` so hosts can mix and
/// match implementations; [`HostContext::from_browser`] covers the common case
/// of one browser object implementing every UI capability.
#[derive(Clone)]
pub struct HostContext {
    prefs: Arc<dyn PersistentKv>,
    elements: Arc<dyn ElementQuery>,
    surfaces: Arc<dyn SurfaceEvents>,
    ui: Arc<dyn SurfaceUi>,
    telemetry: Arc<dyn TelemetrySink>,
    installer: Arc<dyn InstallAction>,
    counters: Arc<dyn HostCounters>,
    eligibility: Arc<dyn EligibilityCheck>,
}

impl HostContext {
    /// Build a context from one browser object and a preference store.
    pub fn from_browser<B>(browser: Arc<B>, prefs: Arc<dyn PersistentKv>) -> Self
    where
        B: ElementQuery
            + SurfaceEvents
            + SurfaceUi
            + TelemetrySink
            + InstallAction
            + HostCounters
            + 'static,
    {
        Self {
            prefs,
            elements: browser.clone(),
            surfaces: browser.clone(),
            ui: browser.clone(),
            telemetry: browser.clone(),
            installer: browser.clone(),
            counters: browser,
            eligibility: Arc::new(AlwaysEligible),
        }
    }

    /// Builder: replace the telemetry sink
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Builder: replace the host counters
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<dyn HostCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Builder: replace the eligibility check
    #[must_use]
    pub fn with_eligibility(mut self, eligibility: Arc<dyn EligibilityCheck>) -> Self {
        self.eligibility = eligibility;
        self
    }

    /// Builder: replace the preference store
    #[must_use]
    pub fn with_prefs(mut self, prefs: Arc<dyn PersistentKv>) -> Self {
        self.prefs = prefs;
        self
    }

    pub fn prefs(&self) -> &dyn PersistentKv {
        self.prefs.as_ref()
    }

    pub fn elements(&self) -> &dyn ElementQuery {
        self.elements.as_ref()
    }

    pub fn surfaces(&self) -> &dyn SurfaceEvents {
        self.surfaces.as_ref()
    }

    pub fn ui(&self) -> &dyn SurfaceUi {
        self.ui.as_ref()
    }

    pub fn telemetry(&self) -> &dyn TelemetrySink {
        self.telemetry.as_ref()
    }

    pub fn installer(&self) -> &dyn InstallAction {
        self.installer.as_ref()
    }

    pub fn counters(&self) -> &dyn HostCounters {
        self.counters.as_ref()
    }

    pub fn eligibility(&self) -> &dyn EligibilityCheck {
        self.eligibility.as_ref()
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBrowser;
    use crate::prefs::MemoryKv;

    #[test]
    fn test_no_counters_is_empty() {
        assert!(NoCounters.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_context_shares_one_browser() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        browser.open_window(SurfaceId(1));
        let ctx = HostContext::from_browser(browser.clone(), Arc::new(MemoryKv::new()));

        assert_eq!(ctx.surfaces().open_surfaces(), vec![SurfaceId(1)]);
        ctx.ui().install_trigger(SurfaceId(1)).unwrap();
        assert!(browser.window(SurfaceId(1)).unwrap().trigger_installed);
    }

    #[test]
    fn test_context_builders_replace_capabilities() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        browser.set_counter("clicks", 4);
        let ctx = HostContext::from_browser(browser, Arc::new(MemoryKv::new()))
            .with_counters(Arc::new(NoCounters));

        assert!(ctx.counters().snapshot().unwrap().is_empty());
    }

    struct Ineligible;

    #[async_trait]
    impl EligibilityCheck for Ineligible {
        async fn is_eligible(&self) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_context_eligible_by_default() {
        let browser = Arc::new(InMemoryBrowser::new("client-1"));
        let ctx = HostContext::from_browser(browser, Arc::new(MemoryKv::new()));
        assert!(ctx.eligibility().is_eligible().await.unwrap());

        let ctx = ctx.with_eligibility(Arc::new(Ineligible));
        assert!(!ctx.eligibility().is_eligible().await.unwrap());
    }

    #[tokio::test]
    async fn test_context_telemetry_identity() {
        let browser = Arc::new(InMemoryBrowser::new("client-42"));
        let ctx = HostContext::from_browser(browser, Arc::new(MemoryKv::new()));
        assert_eq!(ctx.telemetry().stable_identity().await.unwrap(), "client-42");
    }
}
