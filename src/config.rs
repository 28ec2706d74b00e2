use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::git::{ConflictPolicy, RepoSettings};
use crate::types::Team;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub sync: SyncConfig,
    pub display: DisplayConfig,
    /// Team name -> admin secret.
    pub teams: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RepositoryConfig {
    pub url: String,
    pub token: String,
    pub branch: String,
    pub checkout_dir: String,
    pub author_name: String,
    pub author_email: String,
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_minutes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub timezone: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: "".to_string(),
            token: "".to_string(),
            branch: "main".to_string(),
            checkout_dir: "~/.rosterboard/data".to_string(),
            author_name: "rosterboard".to_string(),
            author_email: "rosterboard@localhost".to_string(),
            conflict_policy: ConflictPolicy::Surface,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Seoul".to_string(),
        }
    }
}

thread_local! {
    static TEST_CONFIG_PATH: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

#[cfg(test)]
pub fn set_test_config_path(path: PathBuf) {
    TEST_CONFIG_PATH.with(|p| *p.borrow_mut() = Some(path));
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(test)]
        {
            if let Some(path) = TEST_CONFIG_PATH.with(|p| p.borrow().clone()) {
                return Ok(path);
            }
        }

        Ok(dirs::home_dir()
            .context("Could not find home directory")?
            .join(".rosterboard.toml"))
    }

    pub fn load() -> Result<Option<Config>> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(Some(config))
    }

    /// Saved configuration, or the defaults when there is none yet.
    pub fn load_or_default() -> Result<Config> {
        Ok(Self::load()?.unwrap_or_default())
    }

    pub fn save(&self, silent: bool) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content).context("Failed to write config file")?;

        if !silent {
            println!("✅ Configuration saved to: {}", config_path.display());
        }

        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.display
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {e}", self.display.timezone))
    }

    /// Checkout directory with a leading `~` expanded.
    pub fn checkout_dir(&self) -> Result<PathBuf> {
        let raw = self.repository.checkout_dir.trim();
        if raw == "~" || raw.starts_with("~/") {
            let home = dirs::home_dir().context("Could not find home directory")?;
            return Ok(home.join(raw.trim_start_matches('~').trim_start_matches('/')));
        }
        Ok(PathBuf::from(raw))
    }

    pub fn repo_settings(&self) -> Result<RepoSettings> {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        Ok(RepoSettings {
            url: non_empty(&self.repository.url),
            token: non_empty(&self.repository.token),
            branch: self.repository.branch.clone(),
            author_name: self.repository.author_name.clone(),
            author_email: self.repository.author_email.clone(),
            conflict_policy: self.repository.conflict_policy,
            timezone: self.timezone()?,
        })
    }

    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync.interval_minutes.saturating_mul(60))
    }

    pub fn team_secret(&self, team: Team) -> Option<&str> {
        self.teams
            .get(team.name())
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

// CLI helper functions
pub fn create_default_config(overwrite: bool) -> Result<()> {
    let config = Config::default();
    if !std::fs::exists(Config::config_path()?)? || overwrite {
        config.save(true)?;

        println!("📝 Created default configuration file.");
        println!("📍 Point it at the roster repository and set team secrets:");
        println!("   rosterboard config set repo-url https://...");
        println!("   rosterboard config set team-secret:관제SO팀 ...");
        println!("or");
        println!("   {}", Config::config_path()?.display());
    } else {
        println!("Configuration already exists.  Pass `--overwrite` to overwrite.");
    }

    Ok(())
}

fn set_or_not(value: &str) -> &'static str {
    if value.is_empty() { "Not set" } else { "Set" }
}

pub fn show_config() -> Result<()> {
    match Config::load()? {
        Some(config) => {
            println!("🔧 Current configuration:");
            println!(
                "   Repository URL: {}",
                if config.repository.url.is_empty() {
                    "(local only)"
                } else {
                    config.repository.url.as_str()
                }
            );
            println!("   Repository Token: {}", set_or_not(&config.repository.token));
            println!("   Branch: {}", config.repository.branch);
            println!("   Checkout Dir: {}", config.repository.checkout_dir);
            println!(
                "   Author: {} <{}>",
                config.repository.author_name, config.repository.author_email
            );
            println!("   Conflict Policy: {:?}", config.repository.conflict_policy);
            println!("   Sync Interval: {} min", config.sync.interval_minutes);
            println!("   Timezone: {}", config.display.timezone);
            for team in Team::all() {
                println!(
                    "   {} Secret: {}",
                    team,
                    set_or_not(config.team_secret(*team).unwrap_or(""))
                );
            }
        }
        None => {
            println!("❌ No configuration file found.");
            println!("   Run 'rosterboard config init' to create one.");
        }
    }
    Ok(())
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?.unwrap_or_default();

    match key {
        "repo-url" => config.repository.url = value.trim().to_string(),
        "repo-token" => config.repository.token = value.trim().to_string(),
        "branch" => {
            if value.trim().is_empty() {
                anyhow::bail!("Branch name cannot be empty");
            }
            config.repository.branch = value.trim().to_string();
        }
        "checkout-dir" => config.repository.checkout_dir = value.to_string(),
        "author-name" => config.repository.author_name = value.to_string(),
        "author-email" => config.repository.author_email = value.to_string(),
        "conflict-policy" => {
            config.repository.conflict_policy =
                value.parse::<ConflictPolicy>().map_err(anyhow::Error::msg)?;
        }
        "sync-interval" => {
            let minutes = value.parse::<u64>().context("Invalid number value")?;
            config.sync.interval_minutes = minutes;
        }
        "timezone" => {
            value
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("Invalid timezone '{value}': {e}"))?;
            config.display.timezone = value.to_string();
        }
        _ => match key.strip_prefix("team-secret:") {
            Some(team) => {
                let team = team.parse::<Team>().map_err(anyhow::Error::msg)?;
                config.teams.insert(team.name().to_string(), value.to_string());
            }
            None => anyhow::bail!("Unknown config key: {}", key),
        },
    }

    config.save(false)?;
    Ok(())
}
