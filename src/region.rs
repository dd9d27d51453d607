use crate::error::LibraryError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

pub const DEFAULT_REGION: &str = "US";

pub static KNOWN_COUNTRIES: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("US", "United States"),
        ("GB", "United Kingdom"),
        ("CA", "Canada"),
        ("AU", "Australia"),
        ("DE", "Germany"),
        ("FR", "France"),
        ("IT", "Italy"),
        ("ES", "Spain"),
        ("TR", "Turkey"),
    ])
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    pub fn parse(code: &str) -> Result<Self, LibraryError> {
        let code = code.trim();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(LibraryError::InvalidRegion(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn country_name(&self) -> Option<&'static str> {
        KNOWN_COUNTRIES.get(self.0.as_str()).copied()
    }
}

impl Default for Region {
    fn default() -> Self {
        Self(DEFAULT_REGION.to_string())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Region {
    type Error = LibraryError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Region::parse(&value)
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.0
    }
}

#[derive(Debug, Clone)]
pub struct RegionSetting {
    tx: Arc<watch::Sender<Region>>,
}

impl RegionSetting {
    pub fn new(initial: Region) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> Region {
        self.tx.borrow().clone()
    }

    pub fn set(&self, region: Region) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == region {
                false
            } else {
                *current = region;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Region> {
        self.tx.subscribe()
    }
}

impl Default for RegionSetting {
    fn default() -> Self {
        Self::new(Region::default())
    }
}
