use crate::models::ItemKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{0} is not in the library")]
    ItemNotFound(ItemKey),

    #[error("Episode S{season}E{episode} of {show} not found")]
    EpisodeNotFound {
        show: ItemKey,
        season: i32,
        episode: i32,
    },

    #[error("{0} is not a TV show")]
    NotAShow(ItemKey),

    #[error("Rating must be between 0 and 5, got {0}")]
    InvalidRating(u8),

    #[error("Catalog ids are positive integers, got {0}")]
    InvalidId(i32),

    #[error("'{0}' is not an ISO 3166-1 alpha-2 country code")]
    InvalidRegion(String),

    #[error("Catalog request failed: {0:#}")]
    Catalog(anyhow::Error),

    #[error("Library write failed: {0:#}")]
    Store(anyhow::Error),
}

impl LibraryError {
    pub fn user_message(&self) -> String {
        match self {
            LibraryError::Catalog(_) => "Could not reach the catalog. Please try again.".to_string(),
            LibraryError::Store(_) => "Could not save your library. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}
