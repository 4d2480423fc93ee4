use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::planner::{
    HorizonPolicy, PlanSettings, DEFAULT_HORIZON_MONTHS, DEFAULT_SOLVE_TIMEOUT_SECS,
    MAX_HORIZON_MONTHS,
};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_horizon_months")]
    pub horizon_months: usize,
    #[serde(default)]
    pub horizon_policy: HorizonPolicy,
    /// Zero disables the budget.
    #[serde(default = "default_solve_timeout_secs")]
    pub solve_timeout_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub horizon_months: Option<usize>,
    pub horizon_policy: Option<HorizonPolicy>,
    pub solve_timeout_secs: Option<u64>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/debt-optimizer/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        parsed
            .validate()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        let months = self.planner.horizon_months;
        if months == 0 || months > MAX_HORIZON_MONTHS {
            bail!("planner.horizon_months must be between 1 and {MAX_HORIZON_MONTHS}, got {months}");
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(months) = overrides.horizon_months {
            self.planner.horizon_months = months;
        }
        if let Some(policy) = overrides.horizon_policy {
            self.planner.horizon_policy = policy;
        }
        if let Some(secs) = overrides.solve_timeout_secs {
            self.planner.solve_timeout_secs = secs;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn plan_settings(&self) -> PlanSettings {
        self.planner.to_settings()
    }

    pub fn default_template() -> String {
        let template = r#"[server]
host = "127.0.0.1"
port = 5000

[planner]
horizon_months = 24
# "truncate" omits unpaid tails, "reject" fails the request
horizon_policy = "truncate"
# 0 disables the solve time budget
solve_timeout_secs = 30
"#;
        template.to_string()
    }
}

impl PlannerConfig {
    pub fn to_settings(&self) -> PlanSettings {
        let timeout = (self.solve_timeout_secs > 0).then(|| Duration::from_secs(self.solve_timeout_secs));
        PlanSettings::default()
            .with_horizon(self.horizon_months)
            .with_policy(self.horizon_policy)
            .with_timeout(timeout)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon_months: default_horizon_months(),
            horizon_policy: HorizonPolicy::default(),
            solve_timeout_secs: default_solve_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_horizon_months() -> usize {
    DEFAULT_HORIZON_MONTHS
}

fn default_solve_timeout_secs() -> u64 {
    DEFAULT_SOLVE_TIMEOUT_SECS
}
