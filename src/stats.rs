use crate::models::{LibraryItem, MediaKind, WatchStatus};
use serde::Serialize;

/// Episode length assumed when totalling TV watch time.
pub const AVERAGE_EPISODE_MINUTES: u64 = 40;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibraryStats {
    pub total_movies: usize,
    pub watched_movies: usize,
    pub average_movie_rating: f64,
    pub total_shows: usize,
    pub watching_shows: usize,
    pub completed_shows: usize,
    pub on_hold_shows: usize,
    pub dropped_shows: usize,
    pub average_show_rating: f64,
    pub total_movie_minutes: u64,
    pub total_tv_minutes: u64,
    pub movie_time: String,
    pub tv_time: String,
}

pub fn compute(items: &[LibraryItem]) -> LibraryStats {
    let movies: Vec<&LibraryItem> = items.iter().filter(|i| i.kind == MediaKind::Movie).collect();
    let shows: Vec<&LibraryItem> = items.iter().filter(|i| i.kind == MediaKind::Tv).collect();
    let count_shows = |status: fn(&WatchStatus) -> bool| shows.iter().filter(|s| status(&s.status)).count();

    let total_movie_minutes = movies
        .iter()
        .filter(|m| m.is_watched())
        .map(|m| u64::from(m.runtime_minutes.unwrap_or(0)))
        .sum();
    let total_tv_minutes = shows
        .iter()
        .map(|s| u64::from(s.number_of_episodes) * AVERAGE_EPISODE_MINUTES)
        .sum();

    LibraryStats {
        total_movies: movies.len(),
        watched_movies: movies.iter().filter(|m| m.is_watched()).count(),
        average_movie_rating: average_rating(&movies),
        total_shows: shows.len(),
        watching_shows: count_shows(|s| matches!(s, WatchStatus::Watching { .. })),
        completed_shows: count_shows(|s| matches!(s, WatchStatus::Watched)),
        on_hold_shows: count_shows(|s| matches!(s, WatchStatus::OnHold)),
        dropped_shows: count_shows(|s| matches!(s, WatchStatus::Dropped)),
        average_show_rating: average_rating(&shows),
        total_movie_minutes,
        total_tv_minutes,
        movie_time: format_watch_time(total_movie_minutes),
        tv_time: format_watch_time(total_tv_minutes),
    }
}

fn average_rating(items: &[&LibraryItem]) -> f64 {
    let rated: Vec<f64> = items
        .iter()
        .filter(|i| i.rating > 0)
        .map(|i| f64::from(i.rating))
        .collect();
    if rated.is_empty() {
        return 0.0;
    }
    rated.iter().sum::<f64>() / rated.len() as f64
}

pub fn format_watch_time(minutes: u64) -> String {
    let hours = minutes / 60;
    if hours > 24 {
        format!("{} days", hours / 24)
    } else {
        format!("{} hours", hours)
    }
}
