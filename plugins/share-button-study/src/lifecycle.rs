//! Session lifecycle controller.
//!
//! Owns the arena of live surfaces and is the only place that installs or
//! removes per-window state. Installation order is layout hook, styles,
//! trigger interception; teardown reverses it after first reading whether the
//! promoted element was present.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use studykit_host::{HostContext, SurfaceId};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::surface::{Surface, SurfacePhase};

/// Registers surfaces, wires them and tears them down.
pub struct LifecycleController {
    host: HostContext,
    element_id: String,
    surfaces: Mutex<BTreeMap<SurfaceId, Arc<Surface>>>,
    listening: AtomicBool,
}

impl LifecycleController {
    pub fn new(host: HostContext, element_id: impl Into<String>) -> Self {
        Self {
            host,
            element_id: element_id.into(),
            surfaces: Mutex::new(BTreeMap::new()),
            listening: AtomicBool::new(false),
        }
    }

    fn arena(&self) -> MutexGuard<'_, BTreeMap<SurfaceId, Arc<Surface>>> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registered surface, if any.
    pub fn surface(&self, id: SurfaceId) -> Option<Arc<Surface>> {
        self.arena().get(&id).cloned()
    }

    /// Ids of every registered surface, in id order.
    pub fn surface_ids(&self) -> Vec<SurfaceId> {
        self.arena().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.arena().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether new-surface events are being accepted.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    // ─── Startup ────────────────────────────────────────────────────

    /// Wire every open surface, then start listening for new ones.
    pub fn attach_all(&self) -> Result<()> {
        for id in self.host.surfaces().open_surfaces() {
            self.surface_ready(id);
        }
        self.host.surfaces().subscribe()?;
        self.listening.store(true, Ordering::SeqCst);
        info!(surfaces = self.len(), "Listening for surface events");
        Ok(())
    }

    /// Wire a surface that finished loading.
    ///
    /// Surfaces without an address bar are skipped. A repeated ready for an
    /// active surface is a no-op; a partially wired one resumes where it
    /// stopped. Host failures are logged and leave the markers of whatever
    /// did get installed.
    pub fn surface_ready(&self, id: SurfaceId) -> SurfacePhase {
        let existing = self.surface(id);
        if let Some(surface) = &existing
            && surface.phase() == SurfacePhase::Active
        {
            return SurfacePhase::Active;
        }

        match self.host.ui().has_trigger_region(id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(surface = %id, "Skipping surface without trigger region");
                return SurfacePhase::Uninitialized;
            }
            Err(e) => {
                warn!(surface = %id, error = %e, "Could not inspect surface");
                return SurfacePhase::Uninitialized;
            }
        }

        let surface = existing.unwrap_or_else(|| {
            let surface = Arc::new(Surface::new(id));
            self.arena().insert(id, surface.clone());
            surface
        });

        match self.wire(&surface) {
            Ok(()) => {
                surface.activate();
                debug!(surface = %id, "Surface active");
            }
            Err(e) => warn!(surface = %id, error = %e, "Surface only partially wired"),
        }
        surface.phase()
    }

    fn wire(&self, surface: &Surface) -> studykit_host::Result<()> {
        let id = surface.id();
        let ui = self.host.ui();
        let markers = surface.markers();

        if !markers.layout_hook {
            ui.add_layout_reset_hook(id)?;
            surface.mark(|m| m.layout_hook = true);
        }
        if !markers.styles {
            ui.inject_styles(id)?;
            surface.mark(|m| m.styles = true);
        }
        if !markers.trigger {
            ui.install_trigger(id)?;
            surface.mark(|m| m.trigger = true);
        }
        Ok(())
    }

    /// Reinstall trigger interception after a toolbar customization rebuilt
    /// the toolbar. Returns whether anything was reinstalled.
    pub fn layout_reset(&self, id: SurfaceId) -> Result<bool> {
        let Some(surface) = self.surface(id) else {
            return Ok(false);
        };
        if surface.phase() != SurfacePhase::Active || !surface.markers().layout_hook {
            return Ok(false);
        }
        self.host.ui().install_trigger(id)?;
        surface.mark(|m| m.trigger = true);
        debug!(surface = %id, "Reinstalled trigger after layout reset");
        Ok(true)
    }

    // ─── Teardown ───────────────────────────────────────────────────

    /// Stop accepting new-surface events. Runs before any sweep so a surface
    /// appearing mid-shutdown is never wired.
    pub fn stop_listening(&self) -> Result<()> {
        if !self.listening.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.host.surfaces().unsubscribe()?;
        info!("Stopped listening for surface events");
        Ok(())
    }

    /// Tear down one surface. Returns whether the element was present.
    /// Idempotent: an unknown or already torn down surface returns `false`.
    pub fn teardown(&self, id: SurfaceId) -> bool {
        let Some(surface) = self.arena().remove(&id) else {
            return false;
        };
        self.teardown_surface(&surface)
    }

    /// Tear down every registered surface, OR-ing element presence.
    pub fn teardown_all(&self) -> bool {
        let surfaces: Vec<Arc<Surface>> =
            std::mem::take(&mut *self.arena()).into_values().collect();
        surfaces
            .iter()
            .fold(false, |had, surface| self.teardown_surface(surface) || had)
    }

    fn teardown_surface(&self, surface: &Surface) -> bool {
        let id = surface.id();
        let had_element = self
            .host
            .elements()
            .usability_state(id, &self.element_id)
            .map(|state| state.present)
            .unwrap_or_else(|e| {
                debug!(surface = %id, error = %e, "Element state unavailable at teardown");
                false
            });

        let Some(markers) = surface.begin_teardown() else {
            return had_element;
        };

        let ui = self.host.ui();
        let mut failures = 0usize;
        let mut check = |step: &str, result: studykit_host::Result<()>| {
            if let Err(e) = result {
                failures += 1;
                warn!(surface = %id, step, error = %e, "Teardown step failed");
            }
        };

        if markers.highlight {
            check("highlight", ui.set_highlight(id, &self.element_id, false));
        }
        for panel in markers.panels.iter().rev() {
            check("panel", ui.remove_panel(id, *panel));
        }
        if markers.trigger {
            check("trigger", ui.remove_trigger(id));
        }
        if markers.styles {
            check("styles", ui.remove_styles(id));
        }
        if markers.layout_hook {
            check("layout_hook", ui.remove_layout_reset_hook(id));
        }

        debug!(surface = %id, had_element, failures, "Surface torn down");
        had_element
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("element_id", &self.element_id)
            .field("surfaces", &self.surface_ids())
            .field("listening", &self.is_listening())
            .finish()
    }
}
