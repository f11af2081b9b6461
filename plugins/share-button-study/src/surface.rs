//! Per-surface state.
//!
//! A [`Surface`] records what the study installed into one browser window,
//! so teardown removes exactly that and nothing else, and carries the
//! liveness flag a suspended treatment checks before it touches the window
//! again.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use studykit_host::{PanelKind, SurfaceId};

/// Lifecycle phase of a surface.
///
/// ```text
/// Uninitialized ──ready──► Active ──teardown──► TornDown
///       └────────────────teardown───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    /// Known but not (fully) wired
    Uninitialized,
    /// Trigger interception installed
    Active,
    /// Terminal; nothing installed, events ignored
    TornDown,
}

impl fmt::Display for SurfacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
            Self::TornDown => write!(f, "torn_down"),
        }
    }
}

/// What the study has installed into a surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledMarkers {
    pub layout_hook: bool,
    pub styles: bool,
    pub trigger: bool,
    pub highlight: bool,
    pub panels: BTreeSet<PanelKind>,
}

impl InstalledMarkers {
    pub fn is_empty(&self) -> bool {
        !self.layout_hook
            && !self.styles
            && !self.trigger
            && !self.highlight
            && self.panels.is_empty()
    }
}

#[derive(Debug)]
struct SurfaceState {
    phase: SurfacePhase,
    markers: InstalledMarkers,
}

/// One browser window as the study sees it.
#[derive(Debug)]
pub struct Surface {
    id: SurfaceId,
    alive: AtomicBool,
    state: Mutex<SurfaceState>,
}

impl Surface {
    pub fn new(id: SurfaceId) -> Self {
        Self {
            id,
            alive: AtomicBool::new(true),
            state: Mutex::new(SurfaceState {
                phase: SurfacePhase::Uninitialized,
                markers: InstalledMarkers::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// False once teardown has begun. Checked after every suspension point.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SurfacePhase {
        self.state().phase
    }

    pub fn markers(&self) -> InstalledMarkers {
        self.state().markers.clone()
    }

    /// Move to `Active`. Ignored once torn down.
    pub fn activate(&self) {
        let mut state = self.state();
        if state.phase != SurfacePhase::TornDown {
            state.phase = SurfacePhase::Active;
        }
    }

    /// Update the markers in place.
    pub fn mark(&self, f: impl FnOnce(&mut InstalledMarkers)) {
        f(&mut self.state().markers);
    }

    /// Flip to `TornDown` and hand back what was installed. `None` when
    /// teardown already ran.
    pub fn begin_teardown(&self) -> Option<InstalledMarkers> {
        self.alive.store(false, Ordering::SeqCst);
        let mut state = self.state();
        if state.phase == SurfacePhase::TornDown {
            return None;
        }
        state.phase = SurfacePhase::TornDown;
        Some(std::mem::take(&mut state.markers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_surface_is_alive_and_uninitialized() {
        let surface = Surface::new(SurfaceId(1));
        assert!(surface.is_alive());
        assert_eq!(surface.phase(), SurfacePhase::Uninitialized);
        assert!(surface.markers().is_empty());
    }

    #[test]
    fn teardown_returns_markers_once() {
        let surface = Surface::new(SurfaceId(1));
        surface.mark(|m| {
            m.styles = true;
            m.trigger = true;
            m.panels.insert(PanelKind::Offer);
        });
        surface.activate();
        assert_eq!(surface.phase(), SurfacePhase::Active);

        let markers = surface.begin_teardown().unwrap();
        assert!(markers.styles && markers.trigger);
        assert!(markers.panels.contains(&PanelKind::Offer));
        assert!(!surface.is_alive());
        assert!(surface.markers().is_empty());

        assert!(surface.begin_teardown().is_none());
        assert_eq!(surface.phase(), SurfacePhase::TornDown);
    }

    #[test]
    fn torn_down_surface_cannot_reactivate() {
        let surface = Surface::new(SurfaceId(2));
        surface.begin_teardown();
        surface.activate();
        assert_eq!(surface.phase(), SurfacePhase::TornDown);
    }
}
