//! Goal-market arithmetic over provider statistics, events and odds.
//!
//! Everything here is pure. Provider data is messy, so missing or unparseable
//! numbers are read as zero instead of failing the whole computation.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::utils::{lenient_f64, optional_f64, path, round2};

/// Recent-match window used by every per-match rate.
pub const RECENT_MATCHES: f64 = 5.0;

/// Edges at or beyond this many percentage points get highlighted.
pub const EDGE_HIGHLIGHT: i64 = 8;

/// The provider wraps statistics in `{"response": {...}}`; accept either form.
fn statistics_body(stats: &Value) -> &Value {
    stats.get("response").filter(|r| r.is_object()).unwrap_or(stats)
}

pub fn team_name(stats: &Value) -> String {
    path(statistics_body(stats), &["team", "name"])
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalAverages {
    pub scored: f64,
    pub conceded: f64,
}

impl GoalAverages {
    pub fn from_statistics(stats: &Value) -> Self {
        let body = statistics_body(stats);
        Self {
            scored: lenient_f64(path(body, &["goals", "for", "average", "total"])),
            conceded: lenient_f64(path(body, &["goals", "against", "average", "total"])),
        }
    }
}

/// Combined per-match goal expectation: both sides' scored and conceded averages, halved.
pub fn average_goals(home: GoalAverages, away: GoalAverages) -> f64 {
    (home.scored + home.conceded + away.scored + away.conceded) / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalLine {
    Half,
    OneAndHalf,
    TwoAndHalf,
}

impl GoalLine {
    /// Decay constant of the saturation curve for this line.
    pub fn decay(self) -> f64 {
        match self {
            GoalLine::Half => 0.6,
            GoalLine::OneAndHalf => 1.4,
            GoalLine::TwoAndHalf => 2.2,
        }
    }

    pub fn over_label(self) -> &'static str {
        match self {
            GoalLine::Half => "Over 0.5",
            GoalLine::OneAndHalf => "Over 1.5",
            GoalLine::TwoAndHalf => "Over 2.5",
        }
    }

    pub fn under_label(self) -> &'static str {
        match self {
            GoalLine::Half => "Under 0.5",
            GoalLine::OneAndHalf => "Under 1.5",
            GoalLine::TwoAndHalf => "Under 2.5",
        }
    }
}

/// `(1 - e^(-avg/k)) * 100`, an exponential saturation curve. This is an
/// approximation of an over-line probability, not a Poisson CDF.
fn saturation(avg: f64, decay: f64) -> f64 {
    let avg = if avg.is_finite() { avg.max(0.0) } else { 0.0 };
    (1.0 - (-avg / decay).exp()) * 100.0
}

fn percent(value: f64) -> u32 {
    value.round().clamp(0.0, 100.0) as u32
}

/// Probability (percent) that the match goes over `line`, capped at 95.
pub fn over_probability(avg: f64, line: GoalLine) -> u32 {
    percent(saturation(avg, line.decay())).min(95)
}

/// Complement of an over probability, floored at 5.
pub fn under_probability(over: u32) -> u32 {
    100u32.saturating_sub(over).max(5)
}

/// Both-teams-to-score estimate on the same curve with k = 2.5, capped at 95.
pub fn both_teams_score_probability(avg: f64) -> u32 {
    percent(saturation(avg, 2.5)).min(95)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    Yellow,
    Red,
}

impl CardType {
    fn detail(self) -> &'static str {
        match self {
            CardType::Yellow => "Yellow Card",
            CardType::Red => "Red Card",
        }
    }
}

fn event_str<'a>(event: &'a Value, keys: &[&str]) -> &'a str {
    path(event, keys).and_then(|v| v.as_str()).unwrap_or_default()
}

/// Cards of one type per match over the recent window, two decimals.
pub fn card_rate(events: &[Value], card: CardType) -> f64 {
    let total = events
        .iter()
        .filter(|ev| event_str(ev, &["type"]) == "Card" && event_str(ev, &["detail"]) == card.detail())
        .count();
    round2(total as f64 / RECENT_MATCHES)
}

/// First-half goals by `team` per match over the recent window, two decimals.
pub fn first_half_goal_rate(events: &[Value], team: &str) -> f64 {
    let mut goals_per_fixture: BTreeMap<i64, u32> = BTreeMap::new();

    for ev in events {
        let elapsed = path(ev, &["time", "elapsed"]).and_then(|v| v.as_f64());
        let first_half = elapsed.is_some_and(|m| m <= 45.0);
        if first_half && event_str(ev, &["type"]) == "Goal" && event_str(ev, &["team", "name"]) == team {
            let fixture_id = path(ev, &["fixture", "id"]).and_then(|v| v.as_i64()).unwrap_or(0);
            *goals_per_fixture.entry(fixture_id).or_insert(0) += 1;
        }
    }

    let total: u32 = goals_per_fixture.values().sum();
    round2(total as f64 / RECENT_MATCHES)
}

/// Bookmaker-implied probability (percent) of a decimal odd.
pub fn implied_probability(odd: f64) -> u32 {
    if !odd.is_finite() || odd <= 0.0 {
        return 0;
    }
    (100.0 / odd).round().max(0.0) as u32
}

/// Model probability minus implied probability, in percentage points.
pub fn edge(model: u32, implied: u32) -> i64 {
    model as i64 - implied as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeClass {
    HighPositive,
    Neutral,
    HighNegative,
}

impl EdgeClass {
    pub fn classify(edge: i64) -> Self {
        if edge >= EDGE_HIGHLIGHT {
            EdgeClass::HighPositive
        } else if edge <= -EDGE_HIGHLIGHT {
            EdgeClass::HighNegative
        } else {
            EdgeClass::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScorelinePattern {
    pub scoreline: String,
    pub count: usize,
    /// Same score at least twice in the sampled matches.
    pub critical_repetition: bool,
}

/// Most repeated "H-A" result; ties go to the one seen first.
pub fn most_frequent_scoreline(results: &[String]) -> Option<ScorelinePattern> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for result in results {
        match counts.iter_mut().find(|(s, _)| *s == result.as_str()) {
            Some((_, n)) => *n += 1,
            None => counts.push((result.as_str(), 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (scoreline, count) in counts {
        if best.map_or(true, |(_, n)| count > n) {
            best = Some((scoreline, count));
        }
    }

    best.map(|(scoreline, count)| ScorelinePattern {
        scoreline: scoreline.to_string(),
        count,
        critical_repetition: count >= 2,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakInterval {
    pub interval: String,
    pub total: u64,
}

/// Minute bucket (e.g. "76-90") in which a team scored most, from
/// `goals.for.minute` of the statistics object.
pub fn peak_scoring_interval(minutes: Option<&Value>) -> PeakInterval {
    let mut buckets: Vec<(&String, u64)> = minutes
        .and_then(|m| m.as_object())
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k, lenient_f64(v.get("total")).max(0.0) as u64))
                .collect()
        })
        .unwrap_or_default();

    // Chronological order so ties resolve to the earliest bucket.
    buckets.sort_by_key(|(k, _)| {
        k.split('-').next().and_then(|s| s.trim().parse::<u32>().ok()).unwrap_or(u32::MAX)
    });

    let mut peak = PeakInterval { interval: "-".to_string(), total: 0 };
    for (interval, total) in buckets {
        if total > peak.total {
            peak = PeakInterval { interval: interval.clone(), total };
        }
    }
    peak
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOdd {
    pub label: String,
    pub odd: f64,
}

/// Over/Under prices of the first bookmaker that offers that market.
pub fn over_under_odds(odds: &Value) -> Vec<MarketOdd> {
    let is_over_under = |bet: &Value| {
        bet.get("name")
            .and_then(|n| n.as_str())
            .is_some_and(|n| n.to_lowercase().contains("over/under"))
    };

    let bookmakers = path(odds, &["response"])
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("bookmakers"))
        .and_then(|b| b.as_array());

    let Some(bookmakers) = bookmakers else { return Vec::new() };

    let bet = bookmakers
        .iter()
        .filter_map(|b| b.get("bets").and_then(|bets| bets.as_array()))
        .find_map(|bets| bets.iter().find(|bet| is_over_under(*bet)));

    bet.and_then(|b| b.get("values"))
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| {
                    let label = v.get("value")?.as_str()?.to_string();
                    let odd = optional_f64(v.get("odd"))?;
                    Some(MarketOdd { label, odd })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn odd_for(odds: &[MarketOdd], label: &str) -> Option<f64> {
    odds.iter().find(|o| o.label == label).map(|o| o.odd)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSignal {
    pub market: String,
    pub odd: f64,
    pub model_probability: u32,
    pub implied_probability: u32,
    pub edge: i64,
    pub class: EdgeClass,
}

/// Compare the goal model against bookmaker prices for the six Over/Under
/// markets. The value scan clamps at 99 / 1 rather than 95 / 5 so that extreme
/// lines still register an edge.
pub fn scan_value(avg: f64, odds: &[MarketOdd]) -> Vec<ValueSignal> {
    let lines = [GoalLine::Half, GoalLine::OneAndHalf, GoalLine::TwoAndHalf];

    let overs = lines
        .iter()
        .map(|&line| (line.over_label(), percent(saturation(avg, line.decay())).min(99)));
    let unders = lines.iter().map(|&line| {
        let over = percent(saturation(avg, line.decay()));
        (line.under_label(), 100u32.saturating_sub(over).max(1))
    });

    overs
        .chain(unders)
        .filter_map(|(market, model)| {
            let odd = odd_for(odds, market)?;
            let implied = implied_probability(odd);
            let gap = edge(model, implied);
            Some(ValueSignal {
                market: market.to_string(),
                odd,
                model_probability: model,
                implied_probability: implied,
                edge: gap,
                class: EdgeClass::classify(gap),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamDiscipline {
    pub team: String,
    pub yellow_cards: f64,
    pub red_cards: f64,
}

/// Pre-match overview from both teams' statistics and their recent events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchStatistics {
    pub average_goals: f64,
    pub first_half_goals: f64,
    pub over_1_5: u32,
    pub over_2_5: u32,
    pub under_2_5: u32,
    pub home: TeamDiscipline,
    pub away: TeamDiscipline,
}

impl MatchStatistics {
    pub fn compute(home_stats: &Value, away_stats: &Value, home_events: &[Value], away_events: &[Value]) -> Self {
        let avg = average_goals(
            GoalAverages::from_statistics(home_stats),
            GoalAverages::from_statistics(away_stats),
        );
        let home_team = team_name(home_stats);
        let away_team = team_name(away_stats);

        let first_half = (first_half_goal_rate(home_events, &home_team)
            + first_half_goal_rate(away_events, &away_team))
            / 2.0;
        let over_2_5 = over_probability(avg, GoalLine::TwoAndHalf);

        Self {
            average_goals: round2(avg),
            first_half_goals: round2(first_half),
            over_1_5: over_probability(avg, GoalLine::OneAndHalf),
            over_2_5,
            under_2_5: under_probability(over_2_5),
            home: TeamDiscipline {
                yellow_cards: card_rate(home_events, CardType::Yellow),
                red_cards: card_rate(home_events, CardType::Red),
                team: home_team,
            },
            away: TeamDiscipline {
                yellow_cards: card_rate(away_events, CardType::Yellow),
                red_cards: card_rate(away_events, CardType::Red),
                team: away_team,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamPeak {
    pub team: String,
    #[serde(flatten)]
    pub peak: PeakInterval,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityMap {
    pub over_1_5: u32,
    pub over_2_5: u32,
    pub both_teams_score: u32,
    pub under_2_5: u32,
    pub home: TeamPeak,
    pub away: TeamPeak,
}

impl ProbabilityMap {
    pub fn compute(home_stats: &Value, away_stats: &Value) -> Self {
        let avg = average_goals(
            GoalAverages::from_statistics(home_stats),
            GoalAverages::from_statistics(away_stats),
        );
        let over_2_5 = over_probability(avg, GoalLine::TwoAndHalf);
        let minutes = |stats: &Value| path(statistics_body(stats), &["goals", "for", "minute"]).cloned();

        Self {
            over_1_5: over_probability(avg, GoalLine::OneAndHalf),
            over_2_5,
            both_teams_score: both_teams_score_probability(avg),
            under_2_5: under_probability(over_2_5),
            home: TeamPeak {
                team: team_name(home_stats),
                peak: peak_scoring_interval(minutes(home_stats).as_ref()),
            },
            away: TeamPeak {
                team: team_name(away_stats),
                peak: peak_scoring_interval(minutes(away_stats).as_ref()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats(name: &str, scored: &str, conceded: &str) -> Value {
        json!({
            "response": {
                "team": {"name": name},
                "goals": {
                    "for": {
                        "average": {"total": scored},
                        "minute": {
                            "0-15": {"total": 2},
                            "76-90": {"total": 6},
                            "16-30": {"total": 6}
                        }
                    },
                    "against": {"average": {"total": conceded}}
                }
            }
        })
    }

    #[test]
    fn test_average_goals() {
        let home = GoalAverages::from_statistics(&stats("A", "1.5", "1.0"));
        let away = GoalAverages::from_statistics(&stats("B", "1.2", "0.8"));
        assert!((average_goals(home, away) - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_missing_numbers_count_as_zero() {
        let empty = GoalAverages::from_statistics(&json!({"response": []}));
        assert_eq!(empty, GoalAverages { scored: 0.0, conceded: 0.0 });
        assert_eq!(over_probability(average_goals(empty, empty), GoalLine::TwoAndHalf), 0);
    }

    #[test]
    fn test_over_probability_known_values() {
        // 1 - e^(-2.5/2.2) = 0.679 → 68
        assert_eq!(over_probability(2.5, GoalLine::TwoAndHalf), 68);
        // 1 - e^(-2.5/1.4) = 0.832 → 83
        assert_eq!(over_probability(2.5, GoalLine::OneAndHalf), 83);
        assert_eq!(over_probability(2.5, GoalLine::Half), 95);
    }

    #[test]
    fn test_over_probability_is_monotone_and_capped() {
        let mut previous = 0;
        for step in 0..200 {
            let p = over_probability(step as f64 * 0.05, GoalLine::TwoAndHalf);
            assert!(p >= previous);
            previous = p;
        }
        assert_eq!(over_probability(10.0, GoalLine::TwoAndHalf), 95);
    }

    #[test]
    fn test_under_probability_boundaries() {
        assert_eq!(over_probability(0.0, GoalLine::TwoAndHalf), 0);
        assert_eq!(under_probability(0), 100);
        assert_eq!(under_probability(95), 5);
        assert_eq!(under_probability(68), 32);
    }

    #[test]
    fn test_implied_probability() {
        assert_eq!(implied_probability(2.0), 50);
        assert_eq!(implied_probability(1.5), 67);
        assert_eq!(implied_probability(0.0), 0);
        for odd in [1.01, 1.3, 2.75, 9.0, 51.0] {
            let p = implied_probability(odd);
            assert!(p > 0 && p < 100, "odd {} gave {}", odd, p);
        }
    }

    #[test]
    fn test_edge_classification() {
        assert_eq!(edge(68, 55), 13);
        assert_eq!(EdgeClass::classify(8), EdgeClass::HighPositive);
        assert_eq!(EdgeClass::classify(7), EdgeClass::Neutral);
        assert_eq!(EdgeClass::classify(-8), EdgeClass::HighNegative);
    }

    #[test]
    fn test_most_frequent_scoreline() {
        let results: Vec<String> = ["1-0", "1-0", "2-1"].iter().map(|s| s.to_string()).collect();
        let pattern = most_frequent_scoreline(&results).unwrap();
        assert_eq!(pattern.scoreline, "1-0");
        assert_eq!(pattern.count, 2);
        assert!(pattern.critical_repetition);
    }

    #[test]
    fn test_most_frequent_scoreline_tie_keeps_first() {
        let results: Vec<String> = ["2-2", "0-1", "0-1", "2-2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(most_frequent_scoreline(&results).unwrap().scoreline, "2-2");

        let single = vec!["3-1".to_string(), "0-0".to_string()];
        assert!(!most_frequent_scoreline(&single).unwrap().critical_repetition);
        assert!(most_frequent_scoreline(&[]).is_none());
    }

    #[test]
    fn test_card_rate() {
        let events = vec![
            json!({"type": "Card", "detail": "Yellow Card"}),
            json!({"type": "Card", "detail": "Yellow Card"}),
            json!({"type": "Card", "detail": "Red Card"}),
            json!({"type": "Goal", "detail": "Normal Goal"}),
        ];
        assert_eq!(card_rate(&events, CardType::Yellow), 0.4);
        assert_eq!(card_rate(&events, CardType::Red), 0.2);
        assert_eq!(card_rate(&[], CardType::Red), 0.0);
    }

    #[test]
    fn test_first_half_goal_rate() {
        let events = vec![
            json!({"type": "Goal", "time": {"elapsed": 12}, "team": {"name": "Santos"}, "fixture": {"id": 1}}),
            json!({"type": "Goal", "time": {"elapsed": 45}, "team": {"name": "Santos"}, "fixture": {"id": 1}}),
            json!({"type": "Goal", "time": {"elapsed": 30}, "team": {"name": "Santos"}, "fixture": {"id": 2}}),
            json!({"type": "Goal", "time": {"elapsed": 46}, "team": {"name": "Santos"}, "fixture": {"id": 2}}),
            json!({"type": "Goal", "time": {"elapsed": 10}, "team": {"name": "Bahia"}, "fixture": {"id": 2}}),
            json!({"type": "Card", "time": {"elapsed": 5}, "team": {"name": "Santos"}, "fixture": {"id": 3}}),
        ];
        assert_eq!(first_half_goal_rate(&events, "Santos"), 0.6);
        assert_eq!(first_half_goal_rate(&events, "Bahia"), 0.2);
    }

    #[test]
    fn test_peak_scoring_interval_prefers_earliest_bucket_on_tie() {
        let s = stats("A", "1", "1");
        let peak = peak_scoring_interval(path(&s, &["response", "goals", "for", "minute"]));
        assert_eq!(peak, PeakInterval { interval: "16-30".to_string(), total: 6 });
        assert_eq!(peak_scoring_interval(None).interval, "-");
    }

    fn odds_fixture() -> Value {
        json!({
            "response": [{
                "league": {"name": "Premier League"},
                "bookmakers": [
                    {"name": "NoTotals", "bets": [{"name": "Match Winner", "values": [{"value": "Home", "odd": "2.10"}]}]},
                    {"name": "Bet365", "bets": [
                        {"name": "Match Winner", "values": []},
                        {"name": "Goals Over/Under", "values": [
                            {"value": "Over 1.5", "odd": "1.30"},
                            {"value": "Under 1.5", "odd": "3.40"},
                            {"value": "Over 2.5", "odd": "1.80"},
                            {"value": "Under 2.5", "odd": "bad"}
                        ]}
                    ]}
                ]
            }]
        })
    }

    #[test]
    fn test_over_under_odds_uses_first_bookmaker_with_market() {
        let odds = over_under_odds(&odds_fixture());
        assert_eq!(odds.len(), 3);
        assert_eq!(odd_for(&odds, "Over 2.5"), Some(1.8));
        assert_eq!(odd_for(&odds, "Under 2.5"), None);
        assert!(over_under_odds(&json!({"response": []})).is_empty());
    }

    #[test]
    fn test_scan_value() {
        let odds = over_under_odds(&odds_fixture());
        let signals = scan_value(2.5, &odds);

        let markets: Vec<&str> = signals.iter().map(|s| s.market.as_str()).collect();
        assert_eq!(markets, vec!["Over 1.5", "Over 2.5", "Under 1.5"]);

        let over25 = &signals[1];
        assert_eq!(over25.model_probability, 68);
        assert_eq!(over25.implied_probability, 56);
        assert_eq!(over25.edge, 12);
        assert_eq!(over25.class, EdgeClass::HighPositive);

        let under15 = &signals[2];
        assert_eq!(under15.model_probability, 17);
        assert_eq!(under15.implied_probability, 29);
        assert_eq!(under15.class, EdgeClass::HighNegative);
    }

    #[test]
    fn test_probability_map() {
        let map = ProbabilityMap::compute(&stats("A", "1.5", "1.0"), &stats("B", "1.5", "1.0"));
        assert_eq!(map.over_2_5, 68);
        assert_eq!(map.under_2_5, 32);
        assert_eq!(map.both_teams_score, 63);
        assert_eq!(map.home.team, "A");
        assert_eq!(map.home.peak.interval, "16-30");
    }

    #[test]
    fn test_match_statistics() {
        let home_events = vec![
            json!({"type": "Card", "detail": "Yellow Card", "team": {"name": "A"}}),
            json!({"type": "Goal", "time": {"elapsed": 20}, "team": {"name": "A"}, "fixture": {"id": 9}}),
        ];
        let overview = MatchStatistics::compute(&stats("A", "1.5", "1.0"), &stats("B", "1.5", "1.0"), &home_events, &[]);
        assert_eq!(overview.average_goals, 2.5);
        assert_eq!(overview.first_half_goals, 0.1);
        assert_eq!(overview.over_1_5, 83);
        assert_eq!(overview.home.yellow_cards, 0.2);
        assert_eq!(overview.away.team, "B");
    }
}
