//! Treatment registry and planning.
//!
//! A [`Treatment`] is what a variant does on a trigger. Before anything is
//! shown, the treatment is reduced against the current host state to a
//! [`TreatmentPlan`]: the concrete step that would run right now, or
//! [`TreatmentPlan::Skip`] when nothing user-visible would happen.
//!
//! | Treatment | Element usable | Element absent, page shareable | Otherwise |
//! |-----------|----------------|-------------------------------|-----------|
//! | control | skip | skip | skip |
//! | highlight | highlight | skip | skip |
//! | passive-notify | notify | skip | skip |
//! | offer-to-install | notify | offer (not yet added, menu present) | skip |
//! | auto-install | notify | install (not yet added) | skip |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use studykit_host::ElementState;

/// The closed set of registered treatments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Treatment {
    /// No change
    Control,
    /// Briefly emphasize the element
    Highlight,
    /// Show a dismissible notification anchored to the element
    #[serde(alias = "doorhangerDoNothing")]
    PassiveNotify,
    /// Offer to install the element when it is missing
    #[serde(alias = "doorhangerAskToAdd")]
    OfferToInstall,
    /// Install the element without asking, then notify
    #[serde(alias = "doorhangerAddToToolbar")]
    AutoInstall,
}

impl Treatment {
    pub const ALL: [Treatment; 5] = [
        Treatment::Control,
        Treatment::Highlight,
        Treatment::PassiveNotify,
        Treatment::OfferToInstall,
        Treatment::AutoInstall,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Highlight => "highlight",
            Self::PassiveNotify => "passive-notify",
            Self::OfferToInstall => "offer-to-install",
            Self::AutoInstall => "auto-install",
        }
    }

    /// Legacy name still accepted when parsing.
    pub fn alias(&self) -> Option<&'static str> {
        match self {
            Self::PassiveNotify => Some("doorhangerDoNothing"),
            Self::OfferToInstall => Some("doorhangerAskToAdd"),
            Self::AutoInstall => Some("doorhangerAddToToolbar"),
            Self::Control | Self::Highlight => None,
        }
    }

    /// Reduce this treatment to what would run against `snapshot`.
    pub fn plan(&self, snapshot: &HostSnapshot) -> TreatmentPlan {
        let usable = snapshot.element.is_usable();
        match self {
            Self::Control => TreatmentPlan::Skip,
            Self::Highlight if usable => TreatmentPlan::Highlight,
            Self::PassiveNotify if usable => TreatmentPlan::Notify,
            Self::OfferToInstall
                if !snapshot.added
                    && snapshot.shareable
                    && !snapshot.element.present
                    && snapshot.menu_anchor =>
            {
                TreatmentPlan::Offer
            }
            Self::AutoInstall if !snapshot.added && snapshot.shareable && !usable => {
                TreatmentPlan::AutoInstall
            }
            Self::OfferToInstall | Self::AutoInstall if usable => TreatmentPlan::Notify,
            _ => TreatmentPlan::Skip,
        }
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Treatment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.alias() == Some(s))
            .ok_or_else(|| format!("unknown treatment: {s}"))
    }
}

/// Host state a treatment is planned against, read synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSnapshot {
    pub element: ElementState,
    /// Whether the menu anchor exists in the surface
    pub menu_anchor: bool,
    /// Whether the study already installed the element once
    pub added: bool,
    /// Whether the current page can be shared
    pub shareable: bool,
}

/// The concrete step a trigger runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentPlan {
    /// Nothing user-visible; never counted
    Skip,
    Highlight,
    Notify,
    Offer,
    AutoInstall,
}

impl TreatmentPlan {
    /// Telemetry name of the ping this step records.
    pub fn ping_name(&self) -> Option<&'static str> {
        match self {
            Self::Skip => None,
            Self::Highlight => Some("highlight"),
            Self::Notify => Some("doorhanger"),
            Self::Offer => Some("ask-to-add"),
            Self::AutoInstall => Some("add-to-toolbar"),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

impl fmt::Display for TreatmentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Highlight => write!(f, "highlight"),
            Self::Notify => write!(f, "notify"),
            Self::Offer => write!(f, "offer"),
            Self::AutoInstall => write!(f, "auto_install"),
        }
    }
}

/// Whether a step still has to take a slot from the show throttle.
///
/// A trigger is counted once; steps it delegates to are handed
/// `AlreadyCounted` so a single user-visible occurrence never counts twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowCount {
    Uncounted,
    AlreadyCounted,
}
