use crate::db;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

pub const SETTINGS_KEY: &str = "engine";
pub const ENV_ZERO_POLICY: &str = "RESULTSD_ZERO_POLICY";
pub const ENV_REMARK_SEED: &str = "RESULTSD_REMARK_SEED";

/// Whether a recorded total of 0 counts towards a subject's class average.
///
/// Legacy behaviour treats 0 as "not assessed" and leaves it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ZeroPolicy {
    #[default]
    ExcludeZero,
    IncludeZero,
}

impl ZeroPolicy {
    pub fn counts(self, total: i64) -> bool {
        match self {
            ZeroPolicy::ExcludeZero => total != 0,
            ZeroPolicy::IncludeZero => true,
        }
    }

    fn parse(raw: &str) -> Option<ZeroPolicy> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "excludezero" | "exclude_zero" | "exclude" => Some(ZeroPolicy::ExcludeZero),
            "includezero" | "include_zero" | "include" => Some(ZeroPolicy::IncludeZero),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub zero_policy: ZeroPolicy,
    pub remark_seed: Option<u64>,
    pub upsert_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zero_policy: ZeroPolicy::ExcludeZero,
            remark_seed: None,
            upsert_retries: 3,
        }
    }
}

impl EngineConfig {
    /// Defaults, then the workspace settings row, then environment overrides.
    pub fn load(conn: &Connection) -> anyhow::Result<EngineConfig> {
        let mut cfg = match db::settings_get_json(conn, SETTINGS_KEY)? {
            Some(v) => serde_json::from_value(v)?,
            None => EngineConfig::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, SETTINGS_KEY, &serde_json::to_value(self)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = var(ENV_ZERO_POLICY) {
            match ZeroPolicy::parse(&raw) {
                Some(p) => self.zero_policy = p,
                None => tracing::warn!(value = %raw, "ignoring unknown {}", ENV_ZERO_POLICY),
            }
        }
        if let Some(raw) = var(ENV_REMARK_SEED) {
            match raw.trim().parse::<u64>() {
                Ok(seed) => self.remark_seed = Some(seed),
                Err(_) => tracing::warn!(value = %raw, "ignoring non-numeric {}", ENV_REMARK_SEED),
            }
        }
    }

    pub fn remark_rng(&self) -> StdRng {
        match self.remark_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: EngineConfig =
            serde_json::from_value(serde_json::json!({ "remarkSeed": 9 })).expect("parse");
        assert_eq!(cfg.zero_policy, ZeroPolicy::ExcludeZero);
        assert_eq!(cfg.remark_seed, Some(9));
        assert_eq!(cfg.upsert_retries, 3);
    }

    #[test]
    fn env_overrides_stored_values() {
        let mut cfg = EngineConfig::default();
        cfg.apply_env(|k| match k {
            ENV_ZERO_POLICY => Some("includeZero".to_string()),
            ENV_REMARK_SEED => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(cfg.zero_policy, ZeroPolicy::IncludeZero);
        assert_eq!(cfg.remark_seed, None);
    }

    #[test]
    fn zero_policy_counts() {
        assert!(!ZeroPolicy::ExcludeZero.counts(0));
        assert!(ZeroPolicy::ExcludeZero.counts(80));
        assert!(ZeroPolicy::IncludeZero.counts(0));
    }

    #[test]
    fn config_persists_in_settings() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        let cfg = EngineConfig {
            zero_policy: ZeroPolicy::IncludeZero,
            remark_seed: Some(5),
            upsert_retries: 1,
        };
        cfg.save(&conn).expect("save");
        let stored = db::settings_get_json(&conn, SETTINGS_KEY)
            .expect("read")
            .expect("row");
        let back: EngineConfig = serde_json::from_value(stored).expect("decode");
        assert_eq!(back, cfg);
    }
}
