//! Treatment dispatcher.
//!
//! Turns one trigger into at most one user-visible treatment occurrence:
//!
//! 1. record the copy event (always, even when throttled)
//! 2. plan the treatment against current host state
//! 3. take a slot from the show throttle (skipped plans never count)
//! 4. run the planned step
//!
//! Steps 2 and 3 are synchronous, so a second trigger interleaved at any
//! suspension point already sees the incremented count. Every step checks the
//! surface's liveness flag after it resumes and yields
//! [`TriggerOutcome::Abandoned`] instead of touching a torn down window.

use std::fmt;
use std::sync::Arc;

use studykit_host::{HostContext, PanelKind, PingRecord, TriggerContext};
use tracing::{debug, info};

use crate::config::{PrefKeys, StudyConfig};
use crate::error::Result;
use crate::ping_log::PingLog;
use crate::surface::Surface;
use crate::throttle::ShowThrottle;
use crate::treatment::{HostSnapshot, ShowCount, Treatment, TreatmentPlan};

/// Event name recorded for every intercepted copy or cut.
pub const COPY_EVENT: &str = "copy";

/// What a trigger ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The planned step ran
    Shown(TreatmentPlan),
    /// Nothing applicable for the current host state
    Skipped,
    /// The show cap was already reached
    Throttled,
    /// The surface was torn down while the step was suspended
    Abandoned,
}

impl TriggerOutcome {
    pub fn is_shown(&self) -> bool {
        matches!(self, Self::Shown(_))
    }
}

impl fmt::Display for TriggerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shown(plan) => write!(f, "shown:{plan}"),
            Self::Skipped => write!(f, "skipped"),
            Self::Throttled => write!(f, "throttled"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Runs the assigned treatment.
pub struct Dispatcher {
    treatment: Treatment,
    config: Arc<StudyConfig>,
    keys: PrefKeys,
    throttle: ShowThrottle,
    host: HostContext,
    log: Arc<dyn PingLog>,
}

impl Dispatcher {
    pub fn new(
        treatment: Treatment,
        config: Arc<StudyConfig>,
        host: HostContext,
        log: Arc<dyn PingLog>,
    ) -> Self {
        let keys = config.pref_keys();
        let throttle = ShowThrottle::new(keys.counter.clone(), config.max_times_to_show);
        Self {
            treatment,
            config,
            keys,
            throttle,
            host,
            log,
        }
    }

    pub fn treatment(&self) -> Treatment {
        self.treatment
    }

    pub fn throttle(&self) -> &ShowThrottle {
        &self.throttle
    }

    /// Whether the study already installed the element.
    pub fn is_added(&self) -> Result<bool> {
        Ok(self.host.prefs().get_bool(&self.keys.added, false)?)
    }

    /// Send a ping and keep it for the summary.
    pub async fn record(&self, ping: PingRecord) -> Result<()> {
        self.host.telemetry().send(&ping).await?;
        self.log.append(ping).await
    }

    async fn record_step(&self, plan: TreatmentPlan) -> Result<()> {
        match plan.ping_name() {
            Some(name) => self.record(PingRecord::treatment(name)).await,
            None => Ok(()),
        }
    }

    /// Read the host state a plan depends on. `None` when the surface cannot
    /// be queried, which plans as non-usable.
    pub fn snapshot(
        &self,
        surface: &Surface,
        context: &TriggerContext,
    ) -> Result<Option<HostSnapshot>> {
        let elements = self.host.elements();
        let element = match elements.usability_state(surface.id(), &self.config.element_id) {
            Ok(state) => state,
            Err(e) if !e.is_storage() => {
                debug!(surface = %surface.id(), error = %e, "Element query failed");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let menu_anchor = elements
            .usability_state(surface.id(), &self.config.menu_anchor_id)
            .map(|state| state.present)
            .unwrap_or(false);

        Ok(Some(HostSnapshot {
            element,
            menu_anchor,
            added: self.is_added()?,
            shareable: context.is_shareable(),
        }))
    }

    /// Handle one copy or cut on `surface`.
    pub async fn trigger(
        &self,
        surface: &Surface,
        context: &TriggerContext,
    ) -> Result<TriggerOutcome> {
        self.record(PingRecord::event(COPY_EVENT)).await?;
        if !surface.is_alive() {
            return Ok(TriggerOutcome::Abandoned);
        }

        let plan = match self.snapshot(surface, context)? {
            Some(snapshot) => self.treatment.plan(&snapshot),
            None => TreatmentPlan::Skip,
        };
        let outcome = self.execute(surface, plan, ShowCount::Uncounted).await?;
        debug!(
            surface = %surface.id(),
            treatment = %self.treatment,
            %outcome,
            "Trigger handled"
        );
        Ok(outcome)
    }

    /// Run a planned step. `Uncounted` takes a throttle slot first;
    /// `AlreadyCounted` runs the step under a count taken earlier.
    pub async fn execute(
        &self,
        surface: &Surface,
        plan: TreatmentPlan,
        count: ShowCount,
    ) -> Result<TriggerOutcome> {
        if plan.is_skip() {
            return Ok(TriggerOutcome::Skipped);
        }
        if count == ShowCount::Uncounted
            && !self.throttle.try_acquire(self.host.prefs())?.is_allowed()
        {
            return Ok(TriggerOutcome::Throttled);
        }

        match plan {
            TreatmentPlan::Skip => Ok(TriggerOutcome::Skipped),
            TreatmentPlan::Highlight => self.highlight(surface).await,
            TreatmentPlan::Notify => self.notify(surface).await,
            TreatmentPlan::Offer => self.offer(surface).await,
            TreatmentPlan::AutoInstall => self.auto_install(surface).await,
        }
    }

    // ─── Steps (never count) ────────────────────────────────────────

    async fn highlight(&self, surface: &Surface) -> Result<TriggerOutcome> {
        self.record_step(TreatmentPlan::Highlight).await?;
        if !surface.is_alive() {
            return Ok(TriggerOutcome::Abandoned);
        }
        self.host
            .ui()
            .set_highlight(surface.id(), &self.config.element_id, true)?;
        surface.mark(|m| m.highlight = true);
        Ok(TriggerOutcome::Shown(TreatmentPlan::Highlight))
    }

    async fn notify(&self, surface: &Surface) -> Result<TriggerOutcome> {
        self.record_step(TreatmentPlan::Notify).await?;
        if !surface.is_alive() {
            return Ok(TriggerOutcome::Abandoned);
        }
        self.host.ui().open_panel(
            surface.id(),
            PanelKind::Notification,
            &self.config.element_id,
        )?;
        surface.mark(|m| {
            m.panels.insert(PanelKind::Notification);
        });
        Ok(TriggerOutcome::Shown(TreatmentPlan::Notify))
    }

    /// The offer ping is only recorded once the panel actually opened.
    async fn offer(&self, surface: &Surface) -> Result<TriggerOutcome> {
        self.host
            .ui()
            .open_panel(surface.id(), PanelKind::Offer, &self.config.menu_anchor_id)?;
        surface.mark(|m| {
            m.panels.insert(PanelKind::Offer);
        });
        self.record_step(TreatmentPlan::Offer).await?;
        Ok(TriggerOutcome::Shown(TreatmentPlan::Offer))
    }

    /// Install and flag before the first suspension point so an interleaved
    /// trigger plans against the installed state.
    async fn auto_install(&self, surface: &Surface) -> Result<TriggerOutcome> {
        self.install()?;
        self.record_step(TreatmentPlan::AutoInstall).await?;
        if !surface.is_alive() {
            return Ok(TriggerOutcome::Abandoned);
        }

        if !self.is_usable(surface) {
            return Ok(TriggerOutcome::Shown(TreatmentPlan::AutoInstall));
        }
        Ok(match self.notify(surface).await? {
            TriggerOutcome::Shown(_) => TriggerOutcome::Shown(TreatmentPlan::AutoInstall),
            other => other,
        })
    }

    fn install(&self) -> Result<()> {
        self.host
            .installer()
            .install(&self.config.element_id, self.config.install_area)?;
        self.host.prefs().set(&self.keys.added, true.into())?;
        info!(
            element = %self.config.element_id,
            area = %self.config.install_area,
            "Installed element"
        );
        Ok(())
    }

    fn is_usable(&self, surface: &Surface) -> bool {
        self.host
            .elements()
            .usability_state(surface.id(), &self.config.element_id)
            .is_ok_and(|state| state.is_usable())
    }

    // ─── Follow-up Events ───────────────────────────────────────────

    /// The user accepted the install offer.
    ///
    /// Installs at most once ever, closes the offer and highlights the new
    /// element under the offer's count. Returns `Skipped` when no offer was
    /// opened on this surface, the element was already installed or nothing
    /// could be highlighted.
    pub async fn accept_offer(&self, surface: &Surface) -> Result<TriggerOutcome> {
        if self.treatment != Treatment::OfferToInstall
            || !surface.markers().panels.contains(&PanelKind::Offer)
        {
            debug!(surface = %surface.id(), "Offer accepted without an open offer; ignoring");
            return Ok(TriggerOutcome::Skipped);
        }
        if self.is_added()? {
            debug!(surface = %surface.id(), "Offer accepted after install; ignoring");
            return Ok(TriggerOutcome::Skipped);
        }
        if !surface.is_alive() {
            return Ok(TriggerOutcome::Abandoned);
        }

        self.install()?;
        self.host.ui().close_panel(surface.id(), PanelKind::Offer)?;

        if !self.is_usable(surface) {
            return Ok(TriggerOutcome::Skipped);
        }
        self.execute(surface, TreatmentPlan::Highlight, ShowCount::AlreadyCounted)
            .await
    }

    /// The emphasis animation finished.
    pub fn end_highlight(&self, surface: &Surface) -> Result<()> {
        if !surface.is_alive() || !surface.markers().highlight {
            return Ok(());
        }
        self.host
            .ui()
            .set_highlight(surface.id(), &self.config.element_id, false)?;
        surface.mark(|m| m.highlight = false);
        Ok(())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("treatment", &self.treatment)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}
