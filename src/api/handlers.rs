use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::config::Config;
use crate::db;
use crate::error::{AppError, Result};
use crate::models::{parse_fixtures, AnalysisKind, Fixture, MatchSummary, PaymentProduct, Side};
use crate::services::analytics::{
    average_goals, over_under_odds, scan_value, GoalAverages, MatchStatistics, ProbabilityMap,
};
use crate::services::gateway::is_valid_fixture_listing;
use crate::services::match_list::{listing_dates, playable_matches, MatchListView};
use crate::services::narrative::NarrativePrompt;
use crate::services::{chat_relay, insider, payments};
use crate::utils::is_valid_date;

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::missing_param(name))
}

fn parse_fixture_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("Parameter \"fixtureId\" must be a number, got \"{}\".", raw)))
}

/// Fixture ids arrive as numbers or numeric strings from the front-end.
fn fixture_id_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn require_admin(config: &Config, headers: &HeaderMap) -> Result<()> {
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    match (config.reset_key.as_deref(), presented) {
        (Some(expected), Some(presented)) if expected == presented => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

// ---------------------------------------------------------------------------
// Cache-aware loaders shared by several endpoints
// ---------------------------------------------------------------------------

/// Fixture listing for a date: a valid cached copy, else a fresh fetch that is
/// cached when valid, else an empty listing.
pub async fn load_fixtures(state: &AppState, date: &str) -> Result<Value> {
    if let Some(cached) = db::get_fixtures_for_date(&state.pool, date).await? {
        match serde_json::from_str::<Value>(&cached) {
            Ok(listing) if is_valid_fixture_listing(&listing) => {
                tracing::debug!("Fixture cache hit for {}", date);
                return Ok(listing);
            }
            _ => tracing::warn!("Cached fixtures for {} are invalid, refetching", date),
        }
    } else {
        tracing::info!("No cached fixtures for {}, fetching", date);
    }

    match state.gateway.fixtures_by_date(date).await? {
        Some(listing) => {
            db::put_fixtures_for_date(&state.pool, date, &listing.to_string()).await?;
            tracing::info!("Fixtures for {} cached", date);
            Ok(listing)
        }
        None => Ok(json!({ "response": [] })),
    }
}

/// Team statistics, cached per (match, side) when a cache key is given. Only
/// answers that carry a statistics object are stored.
async fn load_statistics(
    state: &AppState,
    team: &str,
    season: &str,
    league: &str,
    cache: Option<(i64, Side)>,
) -> Result<Value> {
    if let Some((match_id, side)) = cache {
        if let Some(cached) = db::get_prediction(&state.pool, match_id, AnalysisKind::statistics(side)).await? {
            match serde_json::from_str::<Value>(&cached) {
                Ok(stats) => {
                    tracing::debug!("Statistics cache hit: match={} side={:?}", match_id, side);
                    return Ok(stats);
                }
                Err(e) => tracing::warn!("Unreadable cached statistics for {}: {}", match_id, e),
            }
        }
    }

    let stats = state.gateway.team_statistics(team, season, league).await?;

    if let Some((match_id, side)) = cache {
        if stats.get("response").is_some_and(Value::is_object) {
            db::put_prediction(&state.pool, match_id, AnalysisKind::statistics(side), &stats.to_string()).await?;
        } else {
            tracing::warn!("Not caching statistics for team {}: no statistics object", team);
        }
    }

    Ok(stats)
}

async fn load_fixture(state: &AppState, fixture_id: i64) -> Result<Fixture> {
    state
        .gateway
        .fixture_by_id(fixture_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fixture {} not found.", fixture_id)))
}

/// Both teams' statistics for a fixture, through the per-side cache.
async fn load_match_statistics(state: &AppState, fixture: &Fixture) -> Result<(Value, Value)> {
    let season = fixture.league.season.to_string();
    let league = fixture.league.id.to_string();
    let home = fixture.teams.home.id.to_string();
    let away = fixture.teams.away.id.to_string();

    tokio::try_join!(
        load_statistics(state, &home, &season, &league, Some((fixture.id(), Side::Home))),
        load_statistics(state, &away, &season, &league, Some((fixture.id(), Side::Away)))
    )
}

// ---------------------------------------------------------------------------
// Provider-backed endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FixturesQuery {
    pub date: Option<String>,
}

pub async fn fixtures(State(state): State<AppState>, Query(params): Query<FixturesQuery>) -> Result<Json<Value>> {
    let date = required(&params.date, "date")?;
    if !is_valid_date(date) {
        return Err(AppError::BadRequest(format!("Parameter \"date\" must be YYYY-MM-DD, got \"{}\".", date)));
    }
    Ok(Json(load_fixtures(&state, date).await?))
}

#[derive(Deserialize)]
pub struct StatisticsQuery {
    pub team: Option<String>,
    pub season: Option<String>,
    pub league: Option<String>,
    pub id_fixture: Option<String>,
    #[serde(rename = "teamName")]
    pub team_name: Option<String>,
}

pub async fn statistics(State(state): State<AppState>, Query(params): Query<StatisticsQuery>) -> Result<Json<Value>> {
    let team = required(&params.team, "team")?;
    let season = required(&params.season, "season")?;
    let league = required(&params.league, "league")?;

    let fixture_id = params.id_fixture.as_deref().map(parse_fixture_id).transpose()?;
    let side = params
        .team_name
        .as_deref()
        .map(|s| s.parse::<Side>().map_err(AppError::BadRequest))
        .transpose()?;

    let cache = fixture_id.zip(side);
    Ok(Json(load_statistics(&state, team, season, league, cache).await?))
}

pub async fn odds(State(state): State<AppState>, Path(fixture_id): Path<String>) -> Result<Json<Value>> {
    let fixture_id = parse_fixture_id(&fixture_id)?;
    state
        .gateway
        .odds_by_fixture(fixture_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Odds not found.".to_string()))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub team: Option<String>,
    pub season: Option<String>,
    pub league: Option<String>,
}

pub async fn events(State(state): State<AppState>, Query(params): Query<EventsQuery>) -> Result<Json<Value>> {
    let team = required(&params.team, "team")?;
    let season = required(&params.season, "season")?;
    let league = required(&params.league, "league")?;

    let events = state.gateway.recent_match_events(team, season, league).await?;
    Ok(Json(json!({ "response": events })))
}

pub async fn live(State(state): State<AppState>, Path(fixture_id): Path<String>) -> Result<Response> {
    let fixture_id = parse_fixture_id(&fixture_id)?;
    match state.gateway.live_snapshot(fixture_id).await? {
        Some(snapshot) => Ok(Json(snapshot).into_response()),
        None => Err(AppError::NotFound("No live data found for this match.".to_string())),
    }
}

pub async fn insider(State(state): State<AppState>, Path(fixture_id): Path<String>) -> Result<Json<Value>> {
    let fixture_id = parse_fixture_id(&fixture_id)?;
    Ok(Json(insider::cached_report(&state.pool, &state.gateway, fixture_id).await?))
}

// ---------------------------------------------------------------------------
// Narratives
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ChatBody {
    pub prompt: Option<String>,
    #[serde(default)]
    pub id_fixture: Value,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

fn narrative_kind(raw: &str) -> Result<AnalysisKind> {
    let kind = raw.parse::<AnalysisKind>().map_err(AppError::BadRequest)?;
    if !kind.is_narrative() {
        return Err(AppError::BadRequest(format!("\"{}\" is not a narrative type.", kind)));
    }
    Ok(kind)
}

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Result<Json<Value>> {
    let kind = body.kind.as_deref().map(narrative_kind).transpose()?;
    let cache_key = fixture_id_from(&body.id_fixture).zip(kind);

    let text = state
        .narrator
        .generate(&state.pool, cache_key, body.prompt.as_deref())
        .await?;
    Ok(Json(json!({ "ia_prediction": text })))
}

#[derive(Deserialize)]
pub struct NarrativeQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Same cache as `/api/chat`, but the prompt is built here from provider data.
pub async fn match_narrative(
    State(state): State<AppState>,
    Path(fixture_id): Path<String>,
    Query(params): Query<NarrativeQuery>,
) -> Result<Json<Value>> {
    let fixture_id = parse_fixture_id(&fixture_id)?;
    let kind = narrative_kind(required(&params.kind, "type")?)?;

    if let Some(cached) = db::get_prediction(&state.pool, fixture_id, kind).await? {
        return Ok(Json(json!({ "ia_prediction": cached })));
    }

    let fixture = load_fixture(&state, fixture_id).await?;
    let home = fixture.teams.home.name.clone();
    let away = fixture.teams.away.name.clone();

    let prompt = match kind {
        AnalysisKind::Analysis => NarrativePrompt::MatchPreview {
            competition: fixture.league.name.clone(),
            kickoff: fixture
                .kickoff()
                .map_or_else(|| "a date to be confirmed".to_string(), |k| k.format("%d/%m/%Y %H:%M UTC").to_string()),
            home,
            away,
        },
        AnalysisKind::QuickPick => {
            let (home_stats, away_stats) = load_match_statistics(&state, &fixture).await?;
            NarrativePrompt::QuickPick {
                home,
                away,
                home_goals: GoalAverages::from_statistics(&home_stats),
                away_goals: GoalAverages::from_statistics(&away_stats),
            }
        }
        AnalysisKind::HiddenTendency => {
            let ((home_stats, away_stats), odds) = tokio::try_join!(
                load_match_statistics(&state, &fixture),
                state.gateway.odds_by_fixture(fixture_id)
            )?;
            let market = over_under_odds(&odds.unwrap_or(Value::Null));
            if market.is_empty() {
                return Err(AppError::NotFound("Over/Under odds are not available for this match.".to_string()));
            }
            NarrativePrompt::HiddenTendency {
                match_name: fixture.match_name(),
                home,
                away,
                home_goals: GoalAverages::from_statistics(&home_stats),
                away_goals: GoalAverages::from_statistics(&away_stats),
                odds: market,
            }
        }
        AnalysisKind::LiveEntry => {
            let live = state
                .gateway
                .live_snapshot(fixture_id)
                .await?
                .ok_or_else(|| AppError::NotFound("No live data found for this match.".to_string()))?;
            NarrativePrompt::LiveEntry { match_name: fixture.match_name(), live }
        }
        other => return Err(AppError::BadRequest(format!("\"{}\" is not a narrative type.", other))),
    };

    let text = state
        .narrator
        .generate(&state.pool, Some((fixture_id, prompt.kind())), Some(&prompt.render()))
        .await?;
    Ok(Json(json!({ "ia_prediction": text })))
}

// ---------------------------------------------------------------------------
// Match list and derived analytics
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MatchesQuery {
    pub page: Option<usize>,
}

pub async fn matches(State(state): State<AppState>, Query(params): Query<MatchesQuery>) -> Result<Json<Value>> {
    let now = Utc::now();
    let mut fixtures = Vec::new();
    for date in listing_dates(now) {
        fixtures.extend(parse_fixtures(&load_fixtures(&state, &date).await?));
    }

    let view = MatchListView::new(params.page.unwrap_or(1));
    let page = view.paginate(playable_matches(&fixtures, now));
    Ok(Json(serde_json::to_value(page)?))
}

pub async fn match_overview(State(state): State<AppState>, Path(fixture_id): Path<String>) -> Result<Json<Value>> {
    let fixture = load_fixture(&state, parse_fixture_id(&fixture_id)?).await?;
    let season = fixture.league.season.to_string();
    let league = fixture.league.id.to_string();
    let home = fixture.teams.home.id.to_string();
    let away = fixture.teams.away.id.to_string();

    let ((home_stats, away_stats), home_events, away_events) = tokio::try_join!(
        load_match_statistics(&state, &fixture),
        state.gateway.recent_match_events(&home, &season, &league),
        state.gateway.recent_match_events(&away, &season, &league)
    )?;

    Ok(Json(json!({
        "fixture": MatchSummary::from(&fixture),
        "statistics": MatchStatistics::compute(&home_stats, &away_stats, &home_events, &away_events),
        "probabilities": ProbabilityMap::compute(&home_stats, &away_stats),
    })))
}

pub async fn match_value(State(state): State<AppState>, Path(fixture_id): Path<String>) -> Result<Json<Value>> {
    let fixture_id = parse_fixture_id(&fixture_id)?;
    let fixture = load_fixture(&state, fixture_id).await?;

    let ((home_stats, away_stats), odds) = tokio::try_join!(
        load_match_statistics(&state, &fixture),
        state.gateway.odds_by_fixture(fixture_id)
    )?;

    let avg = average_goals(
        GoalAverages::from_statistics(&home_stats),
        GoalAverages::from_statistics(&away_stats),
    );
    let market = over_under_odds(&odds.unwrap_or(Value::Null));

    Ok(Json(json!({
        "fixture": MatchSummary::from(&fixture),
        "average_goals": crate::utils::round2(avg),
        "signals": scan_value(avg, &market),
    })))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn reset_fixtures(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    require_admin(&state.config, &headers)?;
    db::reset_fixtures(&state.pool).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct InvalidateQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

pub async fn invalidate_predictions(
    State(state): State<AppState>,
    Path(fixture_id): Path<String>,
    Query(params): Query<InvalidateQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    require_admin(&state.config, &headers)?;
    let fixture_id = parse_fixture_id(&fixture_id)?;
    let kind = params
        .kind
        .as_deref()
        .map(|k| k.parse::<AnalysisKind>().map_err(AppError::BadRequest))
        .transpose()?;

    let removed = db::invalidate_predictions(&state.pool, fixture_id, kind).await?;
    tracing::info!("Invalidated {} cached artifacts for match {}", removed, fixture_id);
    Ok(Json(json!({ "ok": true, "removed": removed })))
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PreferenceBody {
    #[serde(rename = "type")]
    pub product: Option<String>,
}

pub async fn create_preference(
    State(state): State<AppState>,
    Json(body): Json<PreferenceBody>,
) -> Result<Json<payments::CheckoutPreference>> {
    let product = required(&body.product, "type")?
        .parse::<PaymentProduct>()
        .map_err(AppError::BadRequest)?;

    let preference = state.payments.create_preference(product).await?;
    db::insert_order(&state.pool, &preference.preference_id, product.as_str()).await?;
    Ok(Json(preference))
}

/// Acknowledged with 200 whatever the payload, so the provider stops retrying.
pub async fn mercadopago_webhook(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let Some(preference_id) = payments::approved_preference(&body) else {
        tracing::debug!("Ignoring payment notification ({} bytes)", body.len());
        return StatusCode::OK;
    };

    match db::grant_order_access(&state.pool, &preference_id).await {
        Ok(true) => tracing::info!("Access granted for preference {}", preference_id),
        Ok(false) => tracing::warn!("Payment approved for unknown preference {}", preference_id),
        Err(e) => tracing::error!("Failed to grant access for {}: {}", preference_id, e),
    }
    StatusCode::OK
}

#[derive(Deserialize)]
pub struct OrderStatusQuery {
    pub preference_id: Option<String>,
}

pub async fn order_status(State(state): State<AppState>, Query(params): Query<OrderStatusQuery>) -> Result<Json<Value>> {
    let preference_id = required(&params.preference_id, "preference_id")?;
    let granted = db::order_access(&state.pool, preference_id).await?;
    Ok(Json(json!({ "acesso": granted })))
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn robots(State(state): State<AppState>) -> impl IntoResponse {
    let body = format!(
        "User-agent: *\nAllow: /\nSitemap: {}/sitemap.xml\n",
        state.config.site_url.trim_end_matches('/')
    );
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

pub async fn chat_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| chat_relay::handle_socket(socket, state.relay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_required_rejects_blank() {
        assert_eq!(required(&Some(" 2025-05-01 ".to_string()), "date").unwrap(), "2025-05-01");
        assert!(matches!(required(&Some("  ".to_string()), "date"), Err(AppError::BadRequest(_))));
        assert!(matches!(required(&None, "date"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_fixture_id_parsing() {
        assert_eq!(parse_fixture_id("1035").unwrap(), 1035);
        assert!(parse_fixture_id("1035; DROP TABLE predictions").is_err());
        assert_eq!(fixture_id_from(&json!(77)), Some(77));
        assert_eq!(fixture_id_from(&json!("77")), Some(77));
        assert_eq!(fixture_id_from(&Value::Null), None);
    }

    #[test]
    fn test_require_admin() {
        let mut config = Config::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));

        // Unconfigured key rejects everyone.
        assert!(matches!(require_admin(&config, &headers), Err(AppError::Unauthorized)));

        config.reset_key = Some("secret".to_string());
        assert!(require_admin(&config, &headers).is_ok());
        assert!(require_admin(&config, &HeaderMap::new()).is_err());

        headers.insert("x-api-key", HeaderValue::from_static("wrong"));
        assert!(require_admin(&config, &headers).is_err());
    }

    #[test]
    fn test_narrative_kind() {
        assert_eq!(narrative_kind("palpite").unwrap(), AnalysisKind::QuickPick);
        assert!(narrative_kind("statistics_home").is_err());
        assert!(narrative_kind("bogus").is_err());
    }
}
