//! Query the catalog directly and print what the library would see.
//! Usage:
//!   cargo run --bin catalog_probe -- trending <movie|tv>
//!   cargo run --bin catalog_probe -- search <query...>
//!   cargo run --bin catalog_probe -- detail <movie|tv> <tmdb_id>
//!   cargo run --bin catalog_probe -- season <show_id> <season_number>
//!   cargo run --bin catalog_probe -- providers <movie|tv> <tmdb_id> [REGION]
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use ratchet::models::MediaKind;
use ratchet::region::Region;
use ratchet::tmdb::{self, CatalogApi, Detail, TmdbClient, TMDB_BASE};
use serde_json::json;
use std::env;

const USAGE: &str = "Usage: catalog_probe <trending|search|detail|season|providers> ...";

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("missing {name}\n{USAGE}"))
}

fn int_arg(args: &[String], index: usize, name: &str) -> Result<i32> {
    arg(args, index, name)?
        .parse()
        .with_context(|| format!("{name} must be an integer"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
    let base_url = env::var("TMDB_BASE_URL").unwrap_or_else(|_| TMDB_BASE.to_string());
    let client = TmdbClient::new(api_key, base_url)?;

    let output = match command.as_str() {
        "trending" => {
            let kind: MediaKind = arg(&args, 1, "kind")?.parse()?;
            json!(client.trending(kind).await?)
        }
        "search" => {
            let query = args[1..].join(" ");
            if query.trim().is_empty() {
                bail!("missing query\n{USAGE}");
            }
            json!(tmdb::titles_only(client.search(&query).await?))
        }
        "detail" => {
            let kind: MediaKind = arg(&args, 1, "kind")?.parse()?;
            let id = int_arg(&args, 2, "tmdb_id")?;
            match client.detail(kind, id).await? {
                Detail::Movie(movie) => json!(movie),
                Detail::Show(show) => json!(show),
            }
        }
        "season" => {
            let show_id = int_arg(&args, 1, "show_id")?;
            let season = int_arg(&args, 2, "season_number")?;
            json!(client.season_episodes(show_id, season).await?)
        }
        "providers" => {
            let kind: MediaKind = arg(&args, 1, "kind")?.parse()?;
            let id = int_arg(&args, 2, "tmdb_id")?;
            let region = match args.get(3) {
                Some(code) => Region::parse(code)?,
                None => Region::default(),
            };
            let response = client.watch_providers(kind, id).await?;
            let mut available: Vec<&String> = response.results.keys().collect();
            available.sort();
            json!({
                "region": region,
                "providers": tmdb::providers_for_region(&response, &region),
                "available_regions": available,
            })
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
