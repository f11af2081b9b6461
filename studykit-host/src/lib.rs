//! studykit-host - Host capability API for browser studies
//!
//! A study never touches the browser directly. Everything it needs (durable
//! preferences, toolbar element queries, per-window UI effects, telemetry) is
//! reached through the narrow traits in [`capability`], bundled into a
//! [`HostContext`]. The host in turn drives the study through [`Bootstrap`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use studykit_host::{HostContext, InMemoryBrowser, MemoryKv, Reason, SurfaceId};
//!
//! let browser = Arc::new(InMemoryBrowser::new("client-1"));
//! browser.open_window(SurfaceId(1));
//! let ctx = HostContext::from_browser(browser.clone(), Arc::new(MemoryKv::new()));
//!
//! let study = MyStudy::new(ctx);
//! study.startup(Reason::Install).await?;
//! ```

pub mod capability;
pub mod error;
pub mod event;
pub mod memory;
pub mod prefs;
pub mod types;

use async_trait::async_trait;

pub use capability::{
    AlwaysEligible, EligibilityCheck, ElementQuery, HostContext, HostCounters, InstallAction,
    NoCounters, PersistentKv, SurfaceEvents, SurfaceUi, TelemetrySink,
};
pub use error::{HostError, Result};
pub use event::HostEvent;
pub use memory::{FakeWindow, InMemoryBrowser, UiEffect};
pub use prefs::{MemoryKv, PrefValue, TomlKv};
pub use types::*;

/// Entry points the host calls on a study.
///
/// Mirrors the browser's bootstrapped add-on lifecycle: one `startup`, any
/// number of events, one `shutdown`, each tagged with the [`Reason`]. Methods
/// take `&self` so a host can deliver a surface-closing event while an earlier
/// event is still suspended.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Wire the study into every open surface and start listening.
    async fn startup(&self, reason: Reason) -> std::result::Result<StartupOutcome, Self::Error>;

    /// Remove everything the study installed. Terminal reasons also end the
    /// study for good.
    async fn shutdown(&self, reason: Reason) -> std::result::Result<(), Self::Error>;

    /// React to a host event. Per-surface failures are handled internally.
    async fn handle_event(&self, event: HostEvent);
}
