use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::flexibility::FlexibilityConfig;
use crate::optimizer::{
    GoodLpSolver, MilpOptimizer, ModelLimits, PlanningResult, SolverKind, SolverSettings,
};
use crate::reopt::{ReoptimizationConfig, Reoptimizer};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub solver: SolverConfig,
    pub model: ModelLimits,
    pub flexibility: FlexibilityConfig,
    pub reoptimization: ReoptimizationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// `cbc`, `highs` or `microlp`
    pub kind: String,
    pub time_limit_seconds: u64,
    pub mip_gap: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let defaults = SolverSettings::default();
        Self {
            kind: defaults.kind.to_string(),
            time_limit_seconds: defaults.time_limit_seconds,
            mip_gap: defaults.mip_gap,
        }
    }
}

impl SolverConfig {
    pub fn settings(&self) -> PlanningResult<SolverSettings> {
        Ok(SolverSettings {
            kind: SolverKind::parse(&self.kind)?,
            time_limit_seconds: self.time_limit_seconds,
            mip_gap: self.mip_gap,
        })
    }
}

impl Config {
    /// `config/default.toml` overridden by `FLEX__SECTION__KEY` variables.
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FLEX__").split("__"))
            .extract()
            .with_context(|| format!("loading configuration from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let settings = self.solver.settings()?;
        settings.validate().map_err(anyhow::Error::msg)?;
        self.model.validate().map_err(anyhow::Error::msg)?;
        self.flexibility.validate().map_err(anyhow::Error::msg)?;
        self.reoptimization
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid [reoptimization] section")?;
        Ok(())
    }

    pub fn optimizer(&self) -> Result<MilpOptimizer> {
        Ok(MilpOptimizer::new(
            Arc::new(GoodLpSolver),
            self.solver.settings()?,
            self.model.clone(),
        ))
    }

    pub fn reoptimizer(&self) -> Result<Reoptimizer> {
        Ok(Reoptimizer::new(
            Arc::new(GoodLpSolver),
            self.solver.settings()?,
            self.model.clone(),
            self.flexibility.clone(),
            self.reoptimization.clone(),
        ))
    }
}
