use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::db;
use crate::error::{AppError, Result};
use crate::models::AnalysisKind;
use crate::services::analytics::{most_frequent_scoreline, odd_for, over_under_odds, MarketOdd};
use crate::services::gateway::{SportsGateway, RECENT_FIXTURES};
use crate::utils::path;

/// Over 2.5 priced below this is treated as an abnormal movement.
pub const OVER_2_5_FLOOR: f64 = 1.70;
/// Under 2.5 priced above this is treated as an abnormal movement.
pub const UNDER_2_5_CEILING: f64 = 2.50;

const RISKY_LEAGUES: [&str; 10] = [
    "India",
    "Georgia",
    "Indonesia",
    "Indonésia",
    "Thailand",
    "Tailândia",
    "Malaysia",
    "Malásia",
    "Albania",
    "Albânia",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousBehaviorReport {
    pub odds_alert: String,
    pub goal_pattern: String,
    pub suspicious_league: bool,
    pub verdict: String,
    pub abnormal_odds_movement: bool,
    pub most_common_scoreline: String,
    pub critical_repetition: bool,
}

pub fn is_risky_league(league: &str) -> bool {
    let league = league.to_lowercase();
    RISKY_LEAGUES.iter().any(|risky| league.contains(&risky.to_lowercase()))
}

/// Missing prices never count as abnormal.
pub fn abnormal_odds_movement(odds: &[MarketOdd]) -> bool {
    odd_for(odds, "Over 2.5").is_some_and(|o| o < OVER_2_5_FLOOR)
        || odd_for(odds, "Under 2.5").is_some_and(|o| o > UNDER_2_5_CEILING)
}

/// Combine the odds check, the league watch-list and repeated scorelines of
/// both teams' recent matches into a verdict.
pub fn build_report(odds: &[MarketOdd], league: &str, results: &[String]) -> SuspiciousBehaviorReport {
    let abnormal = abnormal_odds_movement(odds);
    let suspicious_league = is_risky_league(league);

    let odds_alert = if abnormal {
        "⚠️ Abnormal movement detected: the odds are out of the ordinary.".to_string()
    } else {
        "✅ No sign of abnormality: the odds are within normal market standards.".to_string()
    };

    let pattern = most_frequent_scoreline(results);
    let goal_pattern = match &pattern {
        Some(p) if p.critical_repetition => format!(
            "🔁 The result {} appeared {}x in the last {} matches.",
            p.scoreline, p.count, RECENT_FIXTURES
        ),
        Some(p) => format!("🔄 Most common result: {} ({}x)", p.scoreline, p.count),
        None => "N/A".to_string(),
    };

    let critical_repetition = pattern.as_ref().is_some_and(|p| p.critical_repetition);
    let most_common_scoreline = pattern.map_or_else(|| "unknown".to_string(), |p| p.scoreline);

    let verdict = if (abnormal || suspicious_league) && critical_repetition {
        format!(
            "🚨 This match shows suspicious behaviour. Most recurring score: {}.",
            most_common_scoreline
        )
    } else {
        "✅ This match does not show suspicious behaviour.".to_string()
    };

    SuspiciousBehaviorReport {
        odds_alert,
        goal_pattern,
        suspicious_league,
        verdict,
        abnormal_odds_movement: abnormal,
        most_common_scoreline,
        critical_repetition,
    }
}

/// "H-A" for each provider fixture, missing goals as 0.
pub fn scorelines(fixtures: &[Value]) -> Vec<String> {
    fixtures
        .iter()
        .map(|f| {
            let goals = |side: &str| path(f, &["goals", side]).and_then(|g| g.as_i64()).unwrap_or(0);
            format!("{}-{}", goals("home"), goals("away"))
        })
        .collect()
}

/// Fetch odds, the fixture and both teams' recent results, then build the report.
pub async fn investigate(gateway: &SportsGateway, fixture_id: i64) -> Result<SuspiciousBehaviorReport> {
    tracing::info!("Running suspicious-behaviour check for fixture {}", fixture_id);

    let (odds, fixture) = tokio::try_join!(
        gateway.odds_by_fixture(fixture_id),
        gateway.fixture_by_id(fixture_id)
    )?;
    let fixture = fixture.ok_or_else(|| AppError::NotFound(format!("Fixture {} not found.", fixture_id)))?;

    let season = fixture.league.season.to_string();
    let league = fixture.league.id.to_string();
    let home = fixture.teams.home.id.to_string();
    let away = fixture.teams.away.id.to_string();
    let (home_recent, away_recent) = tokio::try_join!(
        gateway.recent_fixtures(&home, &season, &league, RECENT_FIXTURES),
        gateway.recent_fixtures(&away, &season, &league, RECENT_FIXTURES)
    )?;

    let odds = odds.unwrap_or(Value::Null);
    let market = over_under_odds(&odds);
    let league_name = path(&odds, &["response"])
        .and_then(|r| r.get(0))
        .and_then(|r| path(r, &["league", "name"]))
        .and_then(|n| n.as_str())
        .unwrap_or(fixture.league.name.as_str());

    let results: Vec<String> = scorelines(&home_recent).into_iter().chain(scorelines(&away_recent)).collect();
    Ok(build_report(&market, league_name, &results))
}

/// Cache-first wrapper around [`investigate`]. The stored report is returned
/// as-is, whatever shape it was written in.
pub async fn cached_report(pool: &SqlitePool, gateway: &SportsGateway, fixture_id: i64) -> Result<Value> {
    let kind = AnalysisKind::SuspiciousBehavior;
    if let Some(cached) = db::get_prediction(pool, fixture_id, kind).await? {
        match serde_json::from_str::<Value>(&cached) {
            Ok(report) => return Ok(report),
            Err(e) => tracing::warn!("Ignoring unreadable cached report for {}: {}", fixture_id, e),
        }
    }

    let report = investigate(gateway, fixture_id).await?;
    db::put_prediction(pool, fixture_id, kind, &serde_json::to_string(&report)?).await?;
    Ok(serde_json::to_value(report)?)
}
