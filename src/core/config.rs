use super::catalog::ParticipationFormat;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const MAIN_CONFERENCE_ENV: &str = "MAIN_CONFERENCE_CODE";
pub const DEFAULT_MAIN_CONFERENCE: &str = "BCSMIF2025";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Code of the event whose attendance unlocks workshop discounts
    pub main_conference_code: String,
    pub default_participation_format: ParticipationFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            main_conference_code: DEFAULT_MAIN_CONFERENCE.to_string(),
            default_participation_format: ParticipationFormat::InPerson,
        }
    }
}

impl Config {
    /// Read the optional JSON config file, then apply the environment override.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open config {}", path.display()))?;
                serde_json::from_reader(BufReader::new(file))
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Config::default(),
        };
        Ok(config.with_env_override(std::env::var(MAIN_CONFERENCE_ENV).ok()))
    }

    pub fn with_env_override(mut self, main_conference_code: Option<String>) -> Self {
        if let Some(code) = main_conference_code.filter(|c| !c.trim().is_empty()) {
            log::debug!("main conference code overridden to {}", code);
            self.main_conference_code = code.trim().to_string();
        }
        self
    }
}
