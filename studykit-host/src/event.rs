//! Events the host forwards to a running study

use serde::{Deserialize, Serialize};

use crate::types::{SurfaceId, TriggerContext};

/// A host-originated event.
///
/// Surface lifecycle events only arrive while the study is subscribed; UI
/// events (copy, offer accepted, highlight ended) come from interception the
/// study installed itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// A new surface finished loading
    SurfaceReady { surface: SurfaceId },
    /// A surface is about to close
    SurfaceClosing { surface: SurfaceId },
    /// Toolbar customization ended and the toolbar was rebuilt
    LayoutReset { surface: SurfaceId },
    /// The user copied or cut from the address bar
    Copy {
        surface: SurfaceId,
        context: TriggerContext,
    },
    /// The user accepted the install offer panel
    OfferAccepted { surface: SurfaceId },
    /// The emphasis animation finished
    HighlightEnded { surface: SurfaceId },
}

impl HostEvent {
    /// Surface the event belongs to.
    pub fn surface(&self) -> SurfaceId {
        match self {
            Self::SurfaceReady { surface }
            | Self::SurfaceClosing { surface }
            | Self::LayoutReset { surface }
            | Self::Copy { surface, .. }
            | Self::OfferAccepted { surface }
            | Self::HighlightEnded { surface } => *surface,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SurfaceReady { .. } => "surface_ready",
            Self::SurfaceClosing { .. } => "surface_closing",
            Self::LayoutReset { .. } => "layout_reset",
            Self::Copy { .. } => "copy",
            Self::OfferAccepted { .. } => "offer_accepted",
            Self::HighlightEnded { .. } => "highlight_ended",
        }
    }

    /// Whether this is a surface lifecycle event (only delivered while subscribed).
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::SurfaceReady { .. } | Self::SurfaceClosing { .. } | Self::LayoutReset { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = HostEvent::OfferAccepted {
            surface: SurfaceId(3),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"offer_accepted","surface":3}"#);

        let parsed: HostEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_copy_event_roundtrip() {
        let event = HostEvent::Copy {
            surface: SurfaceId(1),
            context: TriggerContext::copy("https://example.com/"),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: HostEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.surface(), SurfaceId(1));
        assert_eq!(parsed.kind(), "copy");
        assert!(!parsed.is_lifecycle());
    }

    #[test]
    fn test_lifecycle_events() {
        let s = SurfaceId(2);
        assert!(HostEvent::SurfaceReady { surface: s }.is_lifecycle());
        assert!(HostEvent::SurfaceClosing { surface: s }.is_lifecycle());
        assert!(HostEvent::LayoutReset { surface: s }.is_lifecycle());
        assert!(!HostEvent::HighlightEnded { surface: s }.is_lifecycle());
    }
}
