use futures_util::future::try_join_all;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{parse_fixtures, Fixture, LiveSnapshot};
use crate::utils::{display_value, lenient_f64, path};

/// Number of past fixtures sampled for per-team event rates.
pub const RECENT_FIXTURES: u32 = 5;

/// Thin client over API-Football (fixtures, statistics, odds, events) and the
/// Sportmonks in-play feed. Stateless apart from the pooled HTTP client.
pub struct SportsGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timezone: String,
    live_url: String,
    live_token: Option<String>,
}

impl SportsGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_football_url.trim_end_matches('/').to_string(),
            api_key: config.api_football_key.clone(),
            timezone: config.fixtures_timezone.clone(),
            live_url: config.sportmonks_url.trim_end_matches('/').to_string(),
            live_token: config.sportmonks_key.clone(),
        })
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("API_FOOTBALL_KEY not set".to_string()))?;

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(query)
            .header("x-apisports-key", api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("{} returned {}: {}", endpoint, status, truncate_text(&body));
            return Err(AppError::Upstream(format!("{} returned {}", endpoint, status)));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// All fixtures on a calendar date. `None` when the provider refused the
    /// call or answered with something that is not a fixture listing; such
    /// answers must not be cached.
    pub async fn fixtures_by_date(&self, date: &str) -> Result<Option<Value>> {
        let query = [("date", date.to_string()), ("timezone", self.timezone.clone())];
        match self.get_json("fixtures", &query).await {
            Ok(listing) if is_valid_fixture_listing(&listing) => Ok(Some(listing)),
            Ok(listing) => {
                tracing::warn!("Unexpected fixtures payload for {}: {}", date, truncate(&listing));
                Ok(None)
            }
            Err(AppError::Json(e)) => {
                tracing::warn!("Fixtures payload for {} is not JSON: {}", date, e);
                Ok(None)
            }
            Err(AppError::Upstream(e)) => {
                tracing::warn!("Fixtures for {} unavailable: {}", date, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn fixture_by_id(&self, fixture_id: i64) -> Result<Option<Fixture>> {
        let listing = self.get_json("fixtures", &[("id", fixture_id.to_string())]).await?;
        Ok(parse_fixtures(&listing).into_iter().next())
    }

    pub async fn team_statistics(&self, team: &str, season: &str, league: &str) -> Result<Value> {
        let query = [
            ("team", team.to_string()),
            ("season", season.to_string()),
            ("league", league.to_string()),
        ];
        self.get_json("teams/statistics", &query).await
    }

    /// Odds for one fixture; `None` when the provider has no odds list for it.
    pub async fn odds_by_fixture(&self, fixture_id: i64) -> Result<Option<Value>> {
        let odds = self.get_json("odds", &[("fixture", fixture_id.to_string())]).await?;
        Ok(odds.get("response").filter(|r| r.is_array()).is_some().then_some(odds))
    }

    /// The team's last `last` fixtures in a league season.
    pub async fn recent_fixtures(&self, team: &str, season: &str, league: &str, last: u32) -> Result<Vec<Value>> {
        let query = [
            ("team", team.to_string()),
            ("season", season.to_string()),
            ("league", league.to_string()),
            ("last", last.to_string()),
        ];
        let listing = self.get_json("fixtures", &query).await?;
        Ok(response_items(listing))
    }

    /// Match events of one fixture, each tagged with `fixture.id` so rates can
    /// group per match.
    pub async fn fixture_events(&self, fixture_id: i64) -> Result<Vec<Value>> {
        let listing = self.get_json("fixtures/events", &[("fixture", fixture_id.to_string())]).await?;
        let mut events = response_items(listing);
        for event in events.iter_mut() {
            if let Some(obj) = event.as_object_mut() {
                obj.insert("fixture".to_string(), serde_json::json!({ "id": fixture_id }));
            }
        }
        Ok(events)
    }

    /// Events of the team's last five fixtures, fetched concurrently.
    pub async fn recent_match_events(&self, team: &str, season: &str, league: &str) -> Result<Vec<Value>> {
        let fixtures = self.recent_fixtures(team, season, league, RECENT_FIXTURES).await?;
        if fixtures.is_empty() {
            tracing::warn!("No recent fixtures for team={} season={} league={}", team, season, league);
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = fixtures
            .iter()
            .filter_map(|f| path(f, &["fixture", "id"]).and_then(|id| id.as_i64()))
            .collect();

        let batches = try_join_all(ids.iter().map(|&id| self.fixture_events(id))).await?;
        let events: Vec<Value> = batches.into_iter().flatten().collect();
        tracing::debug!("Collected {} events across {} fixtures for team {}", events.len(), ids.len(), team);
        Ok(events)
    }

    /// In-play snapshot from Sportmonks, `None` when the match is not live.
    pub async fn live_snapshot(&self, fixture_id: i64) -> Result<Option<LiveSnapshot>> {
        let token = self
            .live_token
            .as_deref()
            .ok_or_else(|| AppError::Config("SPORTMONKS_KEY not set".to_string()))?;

        let response = self
            .client
            .get(format!("{}/livescores/inplay", self.live_url))
            .query(&[
                ("include", "stats".to_string()),
                ("filters", format!("fixture_id:{}", fixture_id)),
                ("api_token", token.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("livescores returned {}: {}", status, truncate_text(&body));
            return Err(AppError::Upstream(format!("livescores returned {}", status)));
        }

        let feed: Value = response.json().await?;
        Ok(normalize_live(&feed))
    }
}

/// A listing is usable only if `response` is an array of entries that each
/// carry `fixture` and `teams` objects.
pub fn is_valid_fixture_listing(listing: &Value) -> bool {
    listing
        .get("response")
        .and_then(|r| r.as_array())
        .is_some_and(|items| {
            items.iter().all(|item| {
                item.get("fixture").is_some_and(|f| f.is_object()) && item.get("teams").is_some_and(|t| t.is_object())
            })
        })
}

fn response_items(listing: Value) -> Vec<Value> {
    match listing {
        Value::Object(mut obj) => match obj.remove("response") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Flatten the first in-play entry of a Sportmonks feed.
pub fn normalize_live(feed: &Value) -> Option<LiveSnapshot> {
    let live = feed.get("data")?.as_array()?.first()?;
    let stats = live.get("stats").and_then(|s| s.as_array()).cloned().unwrap_or_default();
    let stat = |kind: &str| display_value(stats.iter().find(|s| s.get("type").and_then(|t| t.as_str()) == Some(kind)).and_then(|s| s.get("value")));

    Some(LiveSnapshot {
        match_name: live.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string(),
        score: format!(
            "{} x {}",
            lenient_f64(path(live, &["scores", "home_score"])),
            lenient_f64(path(live, &["scores", "away_score"]))
        ),
        minute: lenient_f64(path(live, &["time", "minute"])) as i64,
        dangerous_attacks: stat("dangerous_attacks"),
        total_shots: stat("total_shots"),
        corners: stat("corners"),
        possession: stat("possession"),
    })
}

fn truncate(value: &Value) -> String {
    truncate_text(&value.to_string())
}

fn truncate_text(text: &str) -> String {
    if text.len() <= 200 {
        return text.to_string();
    }
    let mut cut = 200;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixture_listing_validation() {
        assert!(is_valid_fixture_listing(&json!({"response": []})));
        assert!(is_valid_fixture_listing(&json!({
            "response": [{"fixture": {"id": 1}, "teams": {"home": {}, "away": {}}}]
        })));
        assert!(!is_valid_fixture_listing(&json!({"errors": {"token": "invalid"}})));
        assert!(!is_valid_fixture_listing(&json!({"response": [{"fixture": {"id": 1}}]})));
        assert!(!is_valid_fixture_listing(&json!({"response": {"fixture": {}}})));
    }

    #[test]
    fn test_normalize_live() {
        let feed = json!({
            "data": [{
                "name": "Santos vs Bahia",
                "scores": {"home_score": 1, "away_score": 0},
                "time": {"minute": 37},
                "stats": [
                    {"type": "dangerous_attacks", "value": 22},
                    {"type": "possession", "value": "58%"}
                ]
            }]
        });

        let snapshot = normalize_live(&feed).unwrap();
        assert_eq!(snapshot.match_name, "Santos vs Bahia");
        assert_eq!(snapshot.score, "1 x 0");
        assert_eq!(snapshot.minute, 37);
        assert_eq!(snapshot.dangerous_attacks, "22");
        assert_eq!(snapshot.possession, "58%");
        assert_eq!(snapshot.corners, "-");
    }

    #[test]
    fn test_normalize_live_without_data() {
        assert!(normalize_live(&json!({"data": []})).is_none());
        assert!(normalize_live(&json!({"message": "no access"})).is_none());
    }
}
