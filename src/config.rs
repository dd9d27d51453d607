use crate::region::Region;
use crate::tmdb::TMDB_BASE;
use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const REQUIRED_ENV: [&str; 1] = ["TMDB_API_KEY"];

const DEFAULT_DATA_PATH: &str = "ratchet-library.json";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3146";

#[derive(Debug, Clone)]
pub struct Settings {
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub data_path: PathBuf,
    pub region: Region,
    pub bind_addr: SocketAddr,
    pub api_token: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let tmdb_api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .context("TMDB_API_KEY not set")?;
        let region = match non_empty("RATCHET_REGION") {
            Some(code) => Region::parse(&code).context("Invalid RATCHET_REGION")?,
            None => Region::default(),
        };
        let bind_addr = non_empty("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("Invalid BIND_ADDR")?;

        Ok(Self {
            tmdb_api_key,
            tmdb_base_url: non_empty("TMDB_BASE_URL").unwrap_or_else(|| TMDB_BASE.to_string()),
            data_path: non_empty("RATCHET_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH)),
            region,
            bind_addr,
            api_token: non_empty("API_TOKEN"),
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
