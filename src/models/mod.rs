use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One cached artifact per (match, kind). The set is closed so storage never
/// builds SQL identifiers from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Analysis,
    QuickPick,
    HiddenTendency,
    LiveEntry,
    SuspiciousBehavior,
    StatisticsHome,
    StatisticsAway,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 7] = [
        AnalysisKind::Analysis,
        AnalysisKind::QuickPick,
        AnalysisKind::HiddenTendency,
        AnalysisKind::LiveEntry,
        AnalysisKind::SuspiciousBehavior,
        AnalysisKind::StatisticsHome,
        AnalysisKind::StatisticsAway,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Analysis => "analysis",
            AnalysisKind::QuickPick => "quick_pick",
            AnalysisKind::HiddenTendency => "hidden_tendency",
            AnalysisKind::LiveEntry => "live_entry",
            AnalysisKind::SuspiciousBehavior => "suspicious_behavior",
            AnalysisKind::StatisticsHome => "statistics_home",
            AnalysisKind::StatisticsAway => "statistics_away",
        }
    }

    /// Kinds produced by the language model.
    pub fn is_narrative(self) -> bool {
        matches!(
            self,
            AnalysisKind::Analysis
                | AnalysisKind::QuickPick
                | AnalysisKind::HiddenTendency
                | AnalysisKind::LiveEntry
        )
    }

    pub fn statistics(side: Side) -> Self {
        match side {
            Side::Home => AnalysisKind::StatisticsHome,
            Side::Away => AnalysisKind::StatisticsAway,
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The legacy front-end still posts the old column names.
        match s.trim() {
            "analysis" | "analise" => Ok(AnalysisKind::Analysis),
            "quick_pick" | "palpite" => Ok(AnalysisKind::QuickPick),
            "hidden_tendency" | "tendencia_oculta" => Ok(AnalysisKind::HiddenTendency),
            "live_entry" | "entrada_pro" => Ok(AnalysisKind::LiveEntry),
            "suspicious_behavior" | "comportamento_suspeito" => Ok(AnalysisKind::SuspiciousBehavior),
            "statistics_home" => Ok(AnalysisKind::StatisticsHome),
            "statistics_away" => Ok(AnalysisKind::StatisticsAway),
            other => Err(format!("Unknown analysis type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "home" => Ok(Side::Home),
            "away" => Ok(Side::Away),
            other => Err(format!("teamName must be \"home\" or \"away\", got \"{}\"", other)),
        }
    }
}

// ── Provider fixture shape ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixtureStatus {
    #[serde(rename = "NS")]
    NotStarted,
    #[serde(rename = "1H")]
    FirstHalf,
    #[serde(rename = "HT")]
    HalfTime,
    #[serde(rename = "2H")]
    SecondHalf,
    #[serde(rename = "ET")]
    ExtraTime,
    #[serde(rename = "P")]
    Penalties,
    #[serde(rename = "TBD")]
    ToBeDetermined,
    #[serde(rename = "SUSP")]
    Suspended,
    #[serde(rename = "PST")]
    Postponed,
    #[serde(other)]
    Other,
}

impl Default for FixtureStatus {
    fn default() -> Self {
        FixtureStatus::Other
    }
}

impl FixtureStatus {
    /// Statuses shown in the match list: upcoming or in play.
    pub fn is_listable(self) -> bool {
        matches!(
            self,
            FixtureStatus::NotStarted
                | FixtureStatus::FirstHalf
                | FixtureStatus::HalfTime
                | FixtureStatus::SecondHalf
                | FixtureStatus::ExtraTime
                | FixtureStatus::Penalties
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusInfo {
    #[serde(default)]
    pub short: FixtureStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureInfo {
    pub id: i64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: StatusInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teams {
    pub home: TeamRef,
    pub away: TeamRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub season: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Goals {
    pub home: Option<i64>,
    pub away: Option<i64>,
}

/// A fixture as listed by the provider. Entries missing ids are skipped by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub fixture: FixtureInfo,
    pub teams: Teams,
    pub league: League,
    #[serde(default)]
    pub goals: Goals,
}

impl Fixture {
    pub fn id(&self) -> i64 {
        self.fixture.id
    }

    pub fn status(&self) -> FixtureStatus {
        self.fixture.status.short
    }

    pub fn kickoff(&self) -> Option<DateTime<Utc>> {
        self.fixture.date
    }

    pub fn match_name(&self) -> String {
        format!("{} x {}", self.teams.home.name, self.teams.away.name)
    }

    /// Final or current score as "H-A", missing goals count as 0.
    pub fn scoreline(&self) -> String {
        format!("{}-{}", self.goals.home.unwrap_or(0), self.goals.away.unwrap_or(0))
    }
}

/// Parse whatever entries of a provider `response` array are complete fixtures.
pub fn parse_fixtures(listing: &serde_json::Value) -> Vec<Fixture> {
    listing
        .get("response")
        .and_then(|r| r.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Fixture>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

// ── Derived shapes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub match_name: String,
    pub score: String,
    pub minute: i64,
    pub dangerous_attacks: String,
    pub total_shots: String,
    pub corners: String,
    pub possession: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    pub id: i64,
    pub home: String,
    pub away: String,
    pub home_logo: Option<String>,
    pub away_logo: Option<String>,
    pub league: String,
    pub league_id: i64,
    pub season: i64,
    pub home_id: i64,
    pub away_id: i64,
    pub kickoff: Option<DateTime<Utc>>,
    pub status: FixtureStatus,
}

impl From<&Fixture> for MatchSummary {
    fn from(f: &Fixture) -> Self {
        Self {
            id: f.id(),
            home: f.teams.home.name.clone(),
            away: f.teams.away.name.clone(),
            home_logo: f.teams.home.logo.clone(),
            away_logo: f.teams.away.logo.clone(),
            league: f.league.name.clone(),
            league_id: f.league.id,
            season: f.league.season,
            home_id: f.teams.home.id,
            away_id: f.teams.away.id,
            kickoff: f.kickoff(),
            status: f.status(),
        }
    }
}

/// Checkout products sold through the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProduct {
    Palpites,
    Vip,
    Gps,
}

impl PaymentProduct {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentProduct::Palpites => "palpites",
            PaymentProduct::Vip => "vip",
            PaymentProduct::Gps => "gps",
        }
    }
}

impl FromStr for PaymentProduct {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "palpites" => Ok(PaymentProduct::Palpites),
            "vip" => Ok(PaymentProduct::Vip),
            "gps" => Ok(PaymentProduct::Gps),
            _ => Err("\"type\" must be one of [palpites, vip, gps]".to_string()),
        }
    }
}
