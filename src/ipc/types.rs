use std::path::PathBuf;

use crate::config::EngineConfig;
use rand::rngs::StdRng;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: EngineConfig,
    /// Source of remark phrasing; re-seeded whenever the config changes.
    pub rng: StdRng,
}

impl AppState {
    pub fn new() -> Self {
        let config = EngineConfig::default();
        let rng = config.remark_rng();
        AppState {
            workspace: None,
            db: None,
            config,
            rng,
        }
    }
}
