use anyhow::{Context, Result};
use share_button_study::StudyConfig;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<StudyConfig> {
        Self::load_from(
            Self::user_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Load merged configuration from explicit layer paths.
    ///
    /// Missing files are skipped. Tables merge key by key, so a project file
    /// that only sets `max_times_to_show` keeps everything else from the user
    /// file. Arrays such as `weighted_variations` are replaced whole.
    pub fn load_from(user_path: Option<&Path>, project_path: &Path) -> Result<StudyConfig> {
        let mut raw = toml::Table::new();

        // Layer 1: User config
        if let Some(user_path) = user_path
            && user_path.exists()
        {
            let user_config = Self::read_table(user_path)?;
            Self::merge_raw(&mut raw, user_config);
        }

        // Layer 2: Project config
        if project_path.exists() {
            let project_config = Self::read_table(project_path)?;
            Self::merge_raw(&mut raw, project_config);
        }

        let config: StudyConfig = toml::Value::Table(raw).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Get user config path (`$XDG_CONFIG_HOME/studykit/config.toml`)
    pub fn user_config_path() -> Option<PathBuf> {
        Some(studykit_paths::config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with STUDYKIT_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("STUDYKIT_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".studykit/config.toml")
        }
    }

    fn read_table(path: &Path) -> Result<toml::Table> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| format!("invalid config at {}", path.display()))
    }

    /// Merge overlay into base (overlay values override base only if explicitly set)
    fn merge_raw(base: &mut toml::Table, overlay: toml::Table) {
        for (key, value) in overlay {
            match (base.get_mut(&key), value) {
                (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                    Self::merge_raw(base_table, overlay_table);
                }
                (_, value) => {
                    base.insert(key, value);
                }
            }
        }
    }
}
