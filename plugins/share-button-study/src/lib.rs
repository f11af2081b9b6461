//! share-button-study - A/B study promoting the browser's share button
//!
//! Each client is deterministically assigned one treatment variant. When the
//! user copies from the address bar, the assigned treatment runs (highlight
//! the button, show a notification, offer to install it or install it
//! outright), bounded by a persisted show cap. Every ping is logged and the
//! log is folded into a single summary when the study is removed.
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`sampler`] | SHA-256 hash fraction and weighted bucket choice |
//! | [`resolver`] | Manual override, then sampling |
//! | [`treatment`] | Treatment registry and host-state planning |
//! | [`throttle`] | Persisted show counter |
//! | [`dispatcher`] | One trigger to at most one counted occurrence |
//! | [`lifecycle`] | Per-window wiring and teardown |
//! | [`ping_log`] | Append-only ping storage |
//! | [`summary`] | End-of-study summary |
//! | [`study`] | Host bootstrap entry point |

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod ping_log;
pub mod resolver;
pub mod sampler;
pub mod study;
pub mod summary;
pub mod surface;
pub mod throttle;
pub mod treatment;

pub use config::{PingLogConfig, PrefKeys, PrefsConfig, StudyConfig, Variant};
pub use dispatcher::{COPY_EVENT, Dispatcher, TriggerOutcome};
pub use error::{Result, StudyError};
pub use lifecycle::LifecycleController;
pub use ping_log::{InMemoryPingLog, JsonlPingLog, PingLog, filter_first_match};
pub use resolver::{Assignment, AssignmentSource, VariationResolver};
pub use sampler::{choose_weighted, hash_fraction};
pub use study::{Study, StudyState};
pub use summary::{COPIES_FIELD, HAS_ELEMENT_FIELD, SUMMARY_FIELD, SummaryReporter, build_summary};
pub use surface::{InstalledMarkers, Surface, SurfacePhase};
pub use throttle::{ShowThrottle, ThrottleDecision};
pub use treatment::{HostSnapshot, ShowCount, Treatment, TreatmentPlan};
