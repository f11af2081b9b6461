//! Shared types crossing the host/study boundary

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Why the host is starting or stopping the study.
///
/// Numeric codes match the browser's bootstrap reason constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    /// The application is starting up
    AppStartup,
    /// The application is shutting down
    AppShutdown,
    /// The add-on is being enabled
    Enable,
    /// The add-on is being disabled (also sent during uninstallation)
    Disable,
    /// The add-on is being installed
    Install,
    /// The add-on is being uninstalled
    Uninstall,
    /// The add-on is being upgraded
    Upgrade,
    /// The add-on is being downgraded
    Downgrade,
}

impl Reason {
    /// All reasons, in code order.
    pub const ALL: [Reason; 8] = [
        Reason::AppStartup,
        Reason::AppShutdown,
        Reason::Enable,
        Reason::Disable,
        Reason::Install,
        Reason::Uninstall,
        Reason::Upgrade,
        Reason::Downgrade,
    ];

    /// Numeric bootstrap code.
    pub fn code(&self) -> u8 {
        match self {
            Self::AppStartup => 1,
            Self::AppShutdown => 2,
            Self::Enable => 3,
            Self::Disable => 4,
            Self::Install => 5,
            Self::Uninstall => 6,
            Self::Upgrade => 7,
            Self::Downgrade => 8,
        }
    }

    /// Parse a numeric bootstrap code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    /// Terminal reasons end the study: the summary is sent and persisted
    /// state is cleared. Every other shutdown must leave state untouched.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Uninstall | Self::Disable)
    }

    /// String representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppStartup => "app-startup",
            Self::AppShutdown => "app-shutdown",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown reason: {s}"))
    }
}

/// What `startup` left the study in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupOutcome {
    /// Surfaces are wired and triggers will be handled
    Started,
    /// The study is past its expiration instant; the host should uninstall it
    Expired,
    /// The client failed the install-time eligibility check; the host should
    /// uninstall it
    Ineligible,
}

/// Opaque identity of one host UI context (a browser window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

impl From<u64> for SurfaceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Where a toolbar element currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AreaLocation {
    /// A primary toolbar slot, visible and anchorable
    Toolbar,
    /// Collapsed into the toolbar overflow menu
    Overflow,
    /// Inside the application menu panel
    Menu,
    /// Not placed anywhere (customization palette)
    Palette,
}

/// Result of an element usability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub present: bool,
    pub disabled: bool,
    pub location: AreaLocation,
}

impl ElementState {
    /// The element does not exist in this surface.
    pub fn absent() -> Self {
        Self {
            present: false,
            disabled: false,
            location: AreaLocation::Palette,
        }
    }

    /// A present, enabled element at `location`.
    pub fn placed(location: AreaLocation) -> Self {
        Self {
            present: true,
            disabled: false,
            location,
        }
    }

    /// Usable means a treatment can anchor to it: it exists, is enabled and
    /// sits in a primary toolbar slot rather than the overflow menu.
    pub fn is_usable(&self) -> bool {
        self.present && !self.disabled && self.location == AreaLocation::Toolbar
    }
}

/// Area an element can be installed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TargetArea {
    /// The main navigation toolbar
    #[default]
    NavBar,
    /// The tab strip
    TabStrip,
    /// The application menu panel
    MenuPanel,
}

impl TargetArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NavBar => "nav-bar",
            Self::TabStrip => "tab-strip",
            Self::MenuPanel => "menu-panel",
        }
    }
}

impl fmt::Display for TargetArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Popup panels a study can create inside a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PanelKind {
    /// Dismissible notification anchored to the element
    Notification,
    /// Opt-in prompt offering to install the element
    Offer,
}

impl PanelKind {
    pub const ALL: [PanelKind; 2] = [PanelKind::Notification, PanelKind::Offer];

    /// DOM id of the panel element.
    pub fn element_id(&self) -> &'static str {
        match self {
            Self::Notification => "share-button-panel",
            Self::Offer => "share-button-ask-panel",
        }
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_id())
    }
}

/// Clipboard command intercepted on the address bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardCommand {
    #[default]
    Copy,
    Cut,
}

/// Context handed to a trigger: what was intercepted and on which page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TriggerContext {
    pub command: ClipboardCommand,
    /// URL of the page shown in the surface when the trigger fired.
    pub page_url: Option<String>,
}

impl TriggerContext {
    /// A copy on the given page.
    pub fn copy(page_url: impl Into<String>) -> Self {
        Self {
            command: ClipboardCommand::Copy,
            page_url: Some(page_url.into()),
        }
    }

    /// Only web pages can be shared; `about:` and friends cannot.
    pub fn is_shareable(&self) -> bool {
        self.page_url
            .as_deref()
            .and_then(|raw| url::Url::parse(raw).ok())
            .is_some_and(|u| matches!(u.scheme(), "http" | "https"))
    }
}

/// One structured telemetry record: a flat string-to-string map.
///
/// Serializes as a plain JSON object so the summary's embedded log needs no
/// nesting beyond the array itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PingRecord {
    fields: BTreeMap<String, String>,
}

impl PingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{event: name}`
    pub fn event(name: impl Into<String>) -> Self {
        Self::new().with("event", name)
    }

    /// `{treatment: name}`
    pub fn treatment(name: impl Into<String>) -> Self {
        Self::new().with("treatment", name)
    }

    /// `{study_state: state}`
    pub fn study_state(state: impl Into<String>) -> Self {
        Self::new().with("study_state", state)
    }

    /// Builder: add or replace a field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether this record is the event ping `{event: name}`.
    pub fn is_event(&self, name: &str) -> bool {
        self.get("event") == Some(name)
    }

    /// Whether this record is the treatment ping `{treatment: name}`.
    pub fn is_treatment(&self, name: &str) -> bool {
        self.get("treatment") == Some(name)
    }
}

impl fmt::Display for PingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.fields) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PingRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
