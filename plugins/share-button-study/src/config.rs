//! Study configuration types.
//!
//! Everything that shapes a study run: the weighted variation list, the show
//! throttle, expiration, the element the treatments revolve around and where
//! persisted state lives.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use studykit_host::TargetArea;

use crate::error::{Result, StudyError};
use crate::treatment::Treatment;

/// Main study configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Study name, salted into the sampling hash.
    pub study_name: String,
    /// Variants with their relative weights, in bucket order.
    pub weighted_variations: Vec<Variant>,
    /// Maximum number of treatment occurrences over the study's lifetime.
    pub max_times_to_show: u32,
    /// Days from first run until the study expires.
    pub expiration_days: u32,
    /// Toolbar element the treatments promote.
    pub element_id: String,
    /// Element the install offer anchors to (the application menu button).
    pub menu_anchor_id: String,
    /// Where the element is installed.
    pub install_area: TargetArea,
    /// Persisted preference layout.
    pub prefs: PrefsConfig,
    /// Ping log storage.
    pub ping_log: PingLogConfig,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            study_name: "shareButtonStudy".to_string(),
            weighted_variations: Treatment::ALL
                .iter()
                .map(|t| Variant::new(t.as_str(), 1.0))
                .collect(),
            max_times_to_show: 5,
            expiration_days: 14,
            element_id: "social-share-button".to_string(),
            menu_anchor_id: "PanelUI-menu-button".to_string(),
            install_area: TargetArea::NavBar,
            prefs: PrefsConfig::default(),
            ping_log: PingLogConfig::default(),
        }
    }
}

impl StudyConfig {
    /// Reject configurations no run could use: no variants, non-positive or
    /// non-finite weights, names that are not registered treatments.
    pub fn validate(&self) -> Result<()> {
        if self.weighted_variations.is_empty() {
            return Err(StudyError::config("weighted_variations is empty"));
        }
        for variant in &self.weighted_variations {
            if !variant.weight.is_finite() || variant.weight <= 0.0 {
                return Err(StudyError::config(format!(
                    "variant {} has invalid weight {}",
                    variant.name, variant.weight
                )));
            }
            variant.treatment()?;
        }
        if self.element_id.is_empty() {
            return Err(StudyError::config("element_id is empty"));
        }
        Ok(())
    }

    /// Preference keys under the configured prefix.
    pub fn pref_keys(&self) -> PrefKeys {
        PrefKeys::new(&self.prefs.prefix)
    }
}

/// One weighted variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub weight: f64,
}

impl Variant {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    /// The registered treatment this variant names.
    pub fn treatment(&self) -> Result<Treatment> {
        self.name
            .parse()
            .map_err(|_| StudyError::config(format!("variation not valid: {}", self.name)))
    }
}

/// Persisted preference layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefsConfig {
    /// Prefix shared by every key the study writes.
    pub prefix: String,
}

impl Default for PrefsConfig {
    fn default() -> Self {
        Self {
            prefix: "extensions.sharebuttonstudy.".to_string(),
        }
    }
}

/// Ping log storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingLogConfig {
    /// JSONL file holding the log. In memory when unset.
    pub path: Option<PathBuf>,
}

/// Fully qualified preference keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefKeys {
    /// Show count (int)
    pub counter: String,
    /// Manual treatment override (string, optional)
    pub treatment: String,
    /// Whether the element was installed by the study (bool)
    pub added: String,
    /// Expiration instant (RFC 3339 string)
    pub expiration: String,
}

impl PrefKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            counter: format!("{prefix}counter"),
            treatment: format!("{prefix}treatment"),
            added: format!("{prefix}addedBool"),
            expiration: format!("{prefix}expirationDateString"),
        }
    }
}

impl Default for PrefKeys {
    fn default() -> Self {
        StudyConfig::default().pref_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn study_config_default_values() {
        let config = StudyConfig::default();

        assert_eq!(config.study_name, "shareButtonStudy");
        assert_eq!(config.weighted_variations.len(), 5);
        assert_eq!(config.max_times_to_show, 5);
        assert_eq!(config.expiration_days, 14);
        assert_eq!(config.element_id, "social-share-button");
        assert_eq!(config.menu_anchor_id, "PanelUI-menu-button");
        assert_eq!(config.install_area, TargetArea::NavBar);
        assert_eq!(config.prefs.prefix, "extensions.sharebuttonstudy.");
        assert!(config.ping_log.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn study_config_serialization_roundtrip() {
        let config = StudyConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize to toml");
        let parsed: StudyConfig = toml::from_str(&toml_str).expect("parse from toml");
        assert_eq!(config, parsed);
    }

    #[test]
    fn study_config_partial_deserialize() {
        let toml_str = r#"
            study_name = "shareButtonStudyBeta"
            max_times_to_show = 2

            [[weighted_variations]]
            name = "control"
            weight = 1.0

            [[weighted_variations]]
            name = "doorhangerAskToAdd"
            weight = 3.0

            [ping_log]
            path = "/tmp/pings.jsonl"
        "#;

        let config: StudyConfig = toml::from_str(toml_str).expect("parse partial config");

        assert_eq!(config.study_name, "shareButtonStudyBeta");
        assert_eq!(config.max_times_to_show, 2);
        assert_eq!(config.weighted_variations.len(), 2);
        assert_eq!(
            config.weighted_variations[1].treatment().unwrap(),
            Treatment::OfferToInstall
        );
        assert_eq!(
            config.ping_log.path,
            Some(PathBuf::from("/tmp/pings.jsonl"))
        );
        // Defaults fill the rest
        assert_eq!(config.expiration_days, 14);
        assert_eq!(config.element_id, "social-share-button");
    }

    #[test]
    fn validate_rejects_bad_variations() {
        let mut config = StudyConfig {
            weighted_variations: vec![],
            ..StudyConfig::default()
        };
        assert!(matches!(config.validate(), Err(StudyError::Config(_))));

        config.weighted_variations = vec![Variant::new("control", 0.0)];
        assert!(matches!(config.validate(), Err(StudyError::Config(_))));

        config.weighted_variations = vec![Variant::new("control", f64::NAN)];
        assert!(matches!(config.validate(), Err(StudyError::Config(_))));

        config.weighted_variations = vec![Variant::new("confetti", 1.0)];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("variation not valid"));
    }

    #[test]
    fn pref_keys_follow_prefix() {
        let keys = PrefKeys::new("extensions.sharebuttonstudy.");
        assert_eq!(keys.counter, "extensions.sharebuttonstudy.counter");
        assert_eq!(keys.treatment, "extensions.sharebuttonstudy.treatment");
        assert_eq!(keys.added, "extensions.sharebuttonstudy.addedBool");
        assert_eq!(
            keys.expiration,
            "extensions.sharebuttonstudy.expirationDateString"
        );
        assert_eq!(PrefKeys::default(), keys);
    }
}
