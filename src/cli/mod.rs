use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::api::{handlers::load_fixtures, AppState};
use crate::config::Config;
use crate::db::{self, create_pool, init_database_with_pool};
use crate::models::{parse_fixtures, AnalysisKind};
use crate::services::match_list::playable_matches;
use crate::utils::is_valid_date;

async fn open_pool(config: &Config) -> Result<SqlitePool> {
    let pool = create_pool(&config.database_url).await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

pub async fn warm_fixtures(config: Config, date: Option<String>) -> Result<()> {
    let date = date.unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    if !is_valid_date(&date) {
        println!("❌ Invalid date '{}'. Use YYYY-MM-DD", date);
        return Ok(());
    }

    let pool = open_pool(&config).await?;
    let state = AppState::new(pool, config)?;

    println!("📥 Loading fixtures for {}...", date);
    let listing = load_fixtures(&state, &date).await?;
    let fixtures = parse_fixtures(&listing);

    if fixtures.is_empty() {
        println!("📭 No fixtures for {}. Check API_FOOTBALL_KEY or try another date", date);
        return Ok(());
    }

    let playable = playable_matches(&fixtures, Utc::now());
    println!("✅ {} fixtures cached, {} still playable\n", fixtures.len(), playable.len());

    for (i, m) in playable.iter().enumerate() {
        let kickoff = m.kickoff.map_or_else(|| "--:--".to_string(), |k| k.format("%H:%M").to_string());
        println!("{}. [{}] {} x {} ({}) #{}", i + 1, kickoff, m.home, m.away, m.league, m.id);
    }

    Ok(())
}

pub async fn reset_fixtures(config: &Config) -> Result<()> {
    let pool = open_pool(config).await?;
    let removed = db::reset_fixtures(&pool).await?;
    println!("🧹 Cleared cached fixtures for {} dates", removed);
    Ok(())
}

pub async fn show_predictions(config: &Config, match_id: i64) -> Result<()> {
    let pool = open_pool(config).await?;
    let cached = db::get_cached_predictions(&pool, match_id).await?;

    if cached.is_empty() {
        println!("📭 Nothing cached for match {}", match_id);
        return Ok(());
    }

    println!("🎯 Cached analyses for match {}:\n", match_id);
    for (kind, value) in cached {
        println!("── {} ──", kind);
        if kind.is_narrative() {
            println!("{}\n", value);
        } else {
            // Statistics and reports are JSON blobs; keep them short.
            let preview: String = value.chars().take(200).collect();
            println!("{}{}\n", preview, if value.chars().count() > 200 { "…" } else { "" });
        }
    }

    Ok(())
}

pub async fn invalidate(config: &Config, match_id: i64, kind: Option<&str>) -> Result<()> {
    let kind = kind
        .map(|k| k.parse::<AnalysisKind>().map_err(|e| anyhow!(e)))
        .transpose()?;

    let pool = open_pool(config).await?;
    let removed = db::invalidate_predictions(&pool, match_id, kind).await?;

    match kind {
        Some(kind) => println!("🗑️  Removed {} cached {} for match {}", removed, kind, match_id),
        None => println!("🗑️  Removed {} cached analyses for match {}", removed, match_id),
    }
    Ok(())
}
