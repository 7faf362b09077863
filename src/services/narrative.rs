use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::config::Config;
use crate::db;
use crate::error::{AppError, Result};
use crate::models::{AnalysisKind, LiveSnapshot};
use crate::services::analytics::{GoalAverages, MarketOdd, odd_for};

/// Returned in place of an error when the model produced no completion.
pub const NO_RESPONSE: &str = "❌ The AI did not return a response.";

const TEMPERATURE: f64 = 0.7;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
}

/// Client for the chat-completions endpoint, with write-once caching of the
/// generated text per (match, kind).
pub struct NarrativeGenerator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl NarrativeGenerator {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.openai_url.trim_end_matches('/').to_string(),
            api_key: config.openai_key.clone(),
            model: config.openai_model.clone(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if key.starts_with("sk-") => Ok(key),
            _ => Err(AppError::Config("OpenAI API key is not set correctly".to_string())),
        }
    }

    /// Single-turn completion. `None` when the provider answered without a choice.
    pub async fn complete(&self, prompt: &str) -> Result<Option<String>> {
        let api_key = self.api_key()?;

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("chat completion returned {}: {}", status, body)));
        }

        let body: Value = response.json().await?;
        Ok(extract_completion(&body))
    }

    /// Cache-first generation. With a cache key, a stored text is returned
    /// without touching the provider and a fresh completion is stored once.
    /// The prompt is only required on a miss.
    pub async fn generate(
        &self,
        pool: &SqlitePool,
        cache_key: Option<(i64, AnalysisKind)>,
        prompt: Option<&str>,
    ) -> Result<String> {
        if let Some((match_id, kind)) = cache_key {
            if let Some(cached) = db::get_prediction(pool, match_id, kind).await? {
                tracing::debug!("Narrative cache hit: match={} kind={}", match_id, kind);
                return Ok(cached);
            }
        }

        let prompt = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::missing_param("prompt"))?;

        let Some(text) = self.complete(prompt).await? else {
            tracing::warn!("Chat completion had no choices (cache key {:?})", cache_key);
            return Ok(NO_RESPONSE.to_string());
        };

        if let Some((match_id, kind)) = cache_key {
            if db::put_prediction(pool, match_id, kind, &text).await? {
                tracing::info!("Stored {} for match {}", kind, match_id);
            }
        }

        Ok(text)
    }
}

/// First choice's message content, if any.
pub fn extract_completion(body: &Value) -> Option<String> {
    body.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

/// Server-side prompt templates, one per narrative kind.
#[derive(Debug, Clone)]
pub enum NarrativePrompt {
    MatchPreview {
        home: String,
        away: String,
        competition: String,
        kickoff: String,
    },
    QuickPick {
        home: String,
        away: String,
        home_goals: GoalAverages,
        away_goals: GoalAverages,
    },
    HiddenTendency {
        match_name: String,
        home: String,
        away: String,
        home_goals: GoalAverages,
        away_goals: GoalAverages,
        odds: Vec<MarketOdd>,
    },
    LiveEntry {
        match_name: String,
        live: LiveSnapshot,
    },
}

impl NarrativePrompt {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            NarrativePrompt::MatchPreview { .. } => AnalysisKind::Analysis,
            NarrativePrompt::QuickPick { .. } => AnalysisKind::QuickPick,
            NarrativePrompt::HiddenTendency { .. } => AnalysisKind::HiddenTendency,
            NarrativePrompt::LiveEntry { .. } => AnalysisKind::LiveEntry,
        }
    }

    pub fn render(&self) -> String {
        match self {
            NarrativePrompt::MatchPreview { home, away, competition, kickoff } => format!(
                "You are a professional analyst at an international bookmaker. Write a highly strategic, \
                 technical and realistic analysis of {home} x {away}, scheduled for {kickoff}, in {competition}.\n\n\
                 Use this structure, with rich formatting and strategic emojis:\n\n\
                 1️⃣ Introduction 📌 Present the fixture the way a bookmaker would internally: venue, competition context, \
                 emotional stakes, date and time. No generic phrases.\n\
                 2️⃣ The Match and Public Perception 🔍 How the public sees this game, using the last 🔟 results. \
                 Point out whether recent results bias the crowd.\n\
                 3️⃣ House Strategy 🏦 How books are positioning their odds to steer mass behaviour.\n\
                 4️⃣ Real Statistics the House Considers 📈 Goals scored and conceded in the last 🔟 games, \
                 over/under 2.5 trend, head-to-head, both teams to score, first-half goals.\n\
                 5️⃣ Where the Real Value Is 💰 Markets with technical and emotional value. Be precise and numeric.\n\
                 6️⃣ Strategic Conclusion 🧠 Close like a trader: where the distortion is, or whether the market is well priced. \
                 No tips, focus on reading the market.\n\n\
                 🧠 Technical, firm language, like internal minutes of a bookmaker. Nothing generic, nothing obvious."
            ),
            NarrativePrompt::QuickPick { home, away, home_goals, away_goals } => format!(
                "You are a sports-betting risk analyst. Based on the statistics below, recommend the market with the best \
                 statistical value:\n\n\
                 📊 Statistics:\n\
                 - {home}: goals scored {}, conceded {}\n\
                 - {away}: goals scored {}, conceded {}\n\n\
                 🎯 Choose the best among: Over 1.5, Over 2.5, BTTS, Under 2.5, Double Chance, HT Over 0.5, HT Under 0.5\n\
                 ✅ Answer in at most 3 lines. Be technical, direct and logical.",
                home_goals.scored, home_goals.conceded, away_goals.scored, away_goals.conceded
            ),
            NarrativePrompt::HiddenTendency { match_name, home, away, home_goals, away_goals, odds } => {
                let price = |label: &str| odd_for(odds, label).map_or_else(|| "N/A".to_string(), |o| o.to_string());
                format!(
                    "You are a hidden analyst for the bookmakers. Assess \"{match_name}\" with the data below and say whether \
                     there is subtle manipulation or a strategic tendency in the Over/Under markets:\n\n\
                     📊 Statistics:\n\
                     - {home}: goals scored {}, conceded {}\n\
                     - {away}: goals scored {}, conceded {}\n\n\
                     🎯 Available odds:\n\
                     - Over 1.5: {}\n\
                     - Over 2.5: {}\n\
                     - Under 2.5: {}\n\
                     - Under 1.5: {}\n\n\
                     Answer as a pricing analyst. Identify distortions or traps that lure bettors into risky markets. \
                     At most 4 lines.",
                    home_goals.scored,
                    home_goals.conceded,
                    away_goals.scored,
                    away_goals.conceded,
                    price("Over 1.5"),
                    price("Over 2.5"),
                    price("Under 2.5"),
                    price("Under 1.5"),
                )
            }
            NarrativePrompt::LiveEntry { match_name, live } => format!(
                "You are a live sports-trading specialist. Based on the live data of {match_name}, describe the ideal \
                 scenario for a value entry in the next plays.\n\n\
                 ⏱️ Minute: {}'\n\
                 ⚽ Score: {}\n\
                 🔥 Dangerous attacks: {}\n\
                 🥅 Shots: {}\n\
                 🎯 Corners: {}\n\
                 🔁 Possession: {}\n\n\
                 📌 Produce a technical suggestion such as:\n\
                 \"⚠️ If it stays 0x0 until minute 30 and the home side has 3+ shots, consider Over 1.5.\"\n\n\
                 Write professionally and directly. It should read like an experienced trader.",
                live.minute, live.score, live.dangerous_attacks, live.total_shots, live.corners, live.possession
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_completion() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "Under 2.5"}}]});
        assert_eq!(extract_completion(&body).as_deref(), Some("Under 2.5"));

        assert!(extract_completion(&json!({"choices": []})).is_none());
        assert!(extract_completion(&json!({"error": {"message": "quota"}})).is_none());
        assert!(extract_completion(&json!({"choices": [{"message": {"content": "  "}}]})).is_none());
    }

    #[test]
    fn test_api_key_must_look_like_openai_key() {
        let mut config = Config::default();
        config.openai_key = Some("not-a-key".to_string());
        let narrator = NarrativeGenerator::new(&config).unwrap();
        assert!(matches!(narrator.api_key(), Err(AppError::Config(_))));

        config.openai_key = Some("sk-test".to_string());
        let narrator = NarrativeGenerator::new(&config).unwrap();
        assert_eq!(narrator.api_key().unwrap(), "sk-test");
    }

    #[tokio::test]
    async fn test_cached_text_skips_provider() {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::init_database_with_pool(&pool).await.unwrap();
        db::put_prediction(&pool, 99, AnalysisKind::QuickPick, "Over 1.5").await.unwrap();

        // No key configured: reaching the provider would fail.
        let narrator = NarrativeGenerator::new(&Config::default()).unwrap();
        let text = narrator
            .generate(&pool, Some((99, AnalysisKind::QuickPick)), None)
            .await
            .unwrap();
        assert_eq!(text, "Over 1.5");
    }

    #[tokio::test]
    async fn test_miss_without_prompt_is_bad_request() {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::init_database_with_pool(&pool).await.unwrap();

        let narrator = NarrativeGenerator::new(&Config::default()).unwrap();
        let err = narrator
            .generate(&pool, Some((1, AnalysisKind::Analysis)), Some("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_prompt_rendering() {
        let prompt = NarrativePrompt::HiddenTendency {
            match_name: "Santos x Bahia".to_string(),
            home: "Santos".to_string(),
            away: "Bahia".to_string(),
            home_goals: GoalAverages { scored: 1.4, conceded: 0.9 },
            away_goals: GoalAverages { scored: 1.1, conceded: 1.3 },
            odds: vec![MarketOdd { label: "Over 2.5".to_string(), odd: 2.1 }],
        };

        let text = prompt.render();
        assert_eq!(prompt.kind(), AnalysisKind::HiddenTendency);
        assert!(text.contains("\"Santos x Bahia\""));
        assert!(text.contains("- Santos: goals scored 1.4, conceded 0.9"));
        assert!(text.contains("- Over 2.5: 2.1"));
        assert!(text.contains("- Under 1.5: N/A"));
    }
}
