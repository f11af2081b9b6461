//! Variation resolution: manual override first, then the weighted sampler.

use std::fmt;

use serde::{Deserialize, Serialize};
use studykit_host::HostContext;
use tracing::{debug, warn};

use crate::config::{StudyConfig, Variant};
use crate::error::Result;
use crate::sampler::{choose_weighted, hash_fraction};
use crate::treatment::Treatment;

/// How an assignment was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// The manual-override preference named a valid treatment
    Override,
    /// The identity hash picked a bucket
    Sampled,
}

impl fmt::Display for AssignmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Sampled => write!(f, "sampled"),
        }
    }
}

/// The variant a client runs for the whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub variant: Variant,
    pub treatment: Treatment,
    pub source: AssignmentSource,
}

/// Resolves a client's assignment against a configuration.
#[derive(Debug, Clone, Copy)]
pub struct VariationResolver<'a> {
    config: &'a StudyConfig,
}

impl<'a> VariationResolver<'a> {
    pub fn new(config: &'a StudyConfig) -> Self {
        Self { config }
    }

    /// Sampling seed for a client.
    pub fn seed(&self, client_identity: &str) -> String {
        format!("{}{}", self.config.study_name, client_identity)
    }

    /// Resolve from an optional override and the client identity.
    ///
    /// A valid override always wins. An invalid one is logged and ignored.
    /// A sampled name that is not a registered treatment is a configuration
    /// error, never a silent fallback.
    pub fn resolve_with(
        &self,
        override_name: Option<&str>,
        client_identity: &str,
    ) -> Result<Assignment> {
        if let Some(name) = override_name {
            let variant = Variant::new(name, 1.0);
            match variant.treatment() {
                Ok(treatment) => {
                    debug!(%treatment, "Using treatment override");
                    return Ok(Assignment {
                        variant,
                        treatment,
                        source: AssignmentSource::Override,
                    });
                }
                Err(_) => warn!(name, "Ignoring invalid treatment override"),
            }
        }

        let fraction = hash_fraction(&self.seed(client_identity));
        let variant = choose_weighted(&self.config.weighted_variations, fraction)?.clone();
        let treatment = variant.treatment()?;
        debug!(%treatment, fraction, "Sampled variation");
        Ok(Assignment {
            variant,
            treatment,
            source: AssignmentSource::Sampled,
        })
    }

    /// Resolve against the host: reads the override preference and the
    /// telemetry identity. Reads only.
    pub async fn resolve(&self, host: &HostContext) -> Result<Assignment> {
        let keys = self.config.pref_keys();
        let override_name = host.prefs().get_string(&keys.treatment)?;
        let identity = host.telemetry().stable_identity().await?;
        self.resolve_with(override_name.as_deref(), &identity)
    }
}
