//! Normalisation of the provider's JSON payloads
//!
//! The summary endpoint has shipped several layouts over time and every
//! field below has more than one spelling. These functions accept all of the
//! known shapes and never fail; anything unreadable degrades to
//! [`RankReading::Unranked`] or is skipped.

use super::{HistoricalReading, RankReading, RawRank};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

const SOLO_QUEUE_TYPES: [&str; 3] = ["SOLORANKED", "RANKED_SOLO_5X5", "SOLO"];
const UNRANKED: &str = "UNRANKED";

/// Summoner id of the first search hit (`data[0].summoner_id`)
pub fn parse_search(payload: &Value) -> Option<String> {
    let first = payload.get("data")?.as_array()?.first()?;
    match first.get("summoner_id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Solo-queue rank from a summary payload
pub fn parse_summary(payload: &Value) -> RankReading {
    let Some(data) = payload.get("data").and_then(Value::as_object) else {
        return RankReading::Unranked;
    };

    let mut stats = array_field(data, "league_stats");
    if stats.is_empty() {
        if let Some(summoner) = data.get("summoner").and_then(Value::as_object) {
            stats = array_field(summoner, "league_stats");

            if stats.is_empty() {
                // Oldest layout: tier info directly on the summoner, no record
                if let Some(info) = summoner.get("solo_tier_info").and_then(Value::as_object) {
                    return ranked(read_rank(info, None));
                }
            }
        }
    }

    // Solo queue first
    for stat in stats.iter().copied() {
        if SOLO_QUEUE_TYPES.contains(&queue_type(stat).as_str()) {
            let info = stat
                .get("tier_info")
                .and_then(Value::as_object)
                .filter(|info| !info.is_empty())
                .unwrap_or(stat);
            return ranked(read_rank(info, Some(stat)));
        }
    }

    // Otherwise the first entry carrying a ranked tier
    for stat in stats.iter().copied() {
        if let Some(info) = stat.get("tier_info").and_then(Value::as_object) {
            let rank = read_rank(info, Some(stat));
            if !rank.tier.is_empty() && rank.tier != UNRANKED {
                return RankReading::Ranked(rank);
            }
        }
    }

    RankReading::Unranked
}

/// Entries of a tier-history payload. Entries without a readable
/// `created_at`, or without a ranked tier, are dropped.
pub fn parse_tier_history(payload: &Value) -> Vec<HistoricalReading> {
    let Some(entries) = payload.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            let observed_at = entry
                .get("created_at")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)?;

            let info = entry
                .get("tier_info")
                .and_then(Value::as_object)
                .filter(|info| !info.is_empty())
                .unwrap_or(entry);

            let mut rank = read_rank(info, None);
            // History carries no game counters
            rank.wins = 0;
            rank.losses = 0;

            if rank.tier.is_empty() || rank.tier == UNRANKED {
                return None;
            }
            Some(HistoricalReading { rank, observed_at })
        })
        .collect()
}

/// Division in Roman form; integers and digit strings are converted
pub fn division_to_roman(value: &Value) -> String {
    let roman = |n: i64| match n {
        1 => Some("I"),
        2 => Some("II"),
        3 => Some("III"),
        4 => Some("IV"),
        _ => None,
    };

    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(roman)
            .map_or_else(|| n.to_string(), str::to_string),
        Value::String(s) => {
            let upper = s.trim().to_ascii_uppercase();
            upper
                .parse::<i64>()
                .ok()
                .and_then(roman)
                .map_or(upper, str::to_string)
        }
        _ => String::new(),
    }
}

fn ranked(rank: RawRank) -> RankReading {
    if rank.tier.is_empty() || rank.tier == UNRANKED {
        RankReading::Unranked
    } else {
        RankReading::Ranked(rank)
    }
}

fn array_field<'a>(object: &'a Map<String, Value>, key: &str) -> Vec<&'a Map<String, Value>> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

fn queue_type(stat: &Map<String, Value>) -> String {
    let candidates = [
        stat.get("queue_info").and_then(|q| q.get("game_type")),
        stat.get("queue_type"),
        stat.get("tier_info").and_then(|t| t.get("queue_type")),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_ascii_uppercase)
        .unwrap_or_default()
}

/// Tier fields come from `info`, the win/loss record from `record` when given
fn read_rank(info: &Map<String, Value>, record: Option<&Map<String, Value>>) -> RawRank {
    let tier = info
        .get("tier")
        .and_then(Value::as_str)
        .unwrap_or(UNRANKED)
        .trim()
        .to_ascii_uppercase();

    let division = ["division", "rank"]
        .iter()
        .filter_map(|key| info.get(*key))
        .find(|value| truthy(value))
        .map(division_to_roman)
        .unwrap_or_default();

    let points = int_field(info, &["lp"]).unwrap_or(0);
    let (wins, losses) = record.map_or((0, 0), |stat| {
        (
            int_field(stat, &["wins", "win"]).unwrap_or(0),
            int_field(stat, &["losses", "lose"]).unwrap_or(0),
        )
    });

    RawRank {
        tier,
        division,
        points,
        wins,
        losses,
    }
}

/// First key holding a non-null integer (numeric strings accepted)
fn int_field(object: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
        .and_then(|value| match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_i64() != Some(0),
        Value::Bool(b) => *b,
        _ => true,
    }
}

/// ISO-8601 with `Z` or an offset; naive timestamps are taken as UTC
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_search_first_hit() {
        let payload = json!({"data": [{"summoner_id": "abc123"}, {"summoner_id": "zzz"}]});
        assert_eq!(parse_search(&payload), Some("abc123".to_string()));

        assert_eq!(parse_search(&json!({"data": [{"summoner_id": 77}]})), Some("77".to_string()));
        assert_eq!(parse_search(&json!({"data": []})), None);
        assert_eq!(parse_search(&json!({})), None);
    }

    #[test]
    fn test_summary_league_stats_solo_queue() {
        let payload = json!({
            "data": {
                "league_stats": [
                    {
                        "queue_info": {"game_type": "FLEXRANKED"},
                        "tier_info": {"tier": "PLATINUM", "division": 1, "lp": 10},
                        "win": 1, "lose": 1
                    },
                    {
                        "queue_info": {"game_type": "SOLORANKED"},
                        "tier_info": {"tier": "gold", "division": 2, "lp": 55},
                        "win": 30, "lose": 28
                    }
                ]
            }
        });

        assert_eq!(
            parse_summary(&payload),
            RankReading::Ranked(RawRank::new("GOLD", "II", 55).with_record(30, 28))
        );
    }

    #[test]
    fn test_summary_nested_under_summoner_with_alt_keys() {
        let payload = json!({
            "data": {
                "summoner": {
                    "league_stats": [{
                        "queue_type": "RANKED_SOLO_5X5",
                        "tier_info": {"tier": "SILVER", "rank": "3", "lp": 7},
                        "wins": 4, "losses": 0, "win": 99
                    }]
                }
            }
        });

        assert_eq!(
            parse_summary(&payload),
            RankReading::Ranked(RawRank::new("SILVER", "III", 7).with_record(4, 0))
        );
    }

    #[test]
    fn test_summary_solo_tier_info_layout() {
        let payload = json!({
            "data": {"summoner": {"solo_tier_info": {"tier": "MASTER", "division": null, "lp": 210}}}
        });
        assert_eq!(
            parse_summary(&payload),
            RankReading::Ranked(RawRank::new("MASTER", "", 210))
        );
    }

    #[test]
    fn test_summary_queue_type_on_tier_info_and_flat_stat() {
        let payload = json!({
            "data": {"league_stats": [
                {"tier_info": {"queue_type": "solo", "tier": "IRON", "division": "IV", "lp": 1}}
            ]}
        });
        assert_eq!(
            parse_summary(&payload),
            RankReading::Ranked(RawRank::new("IRON", "IV", 1))
        );

        let flat = json!({
            "data": {"league_stats": [
                {"queue_type": "SOLO", "tier": "BRONZE", "division": "I", "lp": 88, "wins": 2, "losses": 3}
            ]}
        });
        assert_eq!(
            parse_summary(&flat),
            RankReading::Ranked(RawRank::new("BRONZE", "I", 88).with_record(2, 3))
        );
    }

    #[test]
    fn test_summary_falls_back_to_first_ranked_entry() {
        let payload = json!({
            "data": {"league_stats": [
                {"queue_info": {"game_type": "ARAM"}, "tier_info": {"tier": null}},
                {"queue_info": {"game_type": "FLEXRANKED"}, "tier_info": {"tier": "UNRANKED"}},
                {"queue_info": {"game_type": "FLEXRANKED"}, "tier_info": {"tier": "DIAMOND", "division": 4, "lp": 0}, "win": 5, "lose": 5}
            ]}
        });
        assert_eq!(
            parse_summary(&payload),
            RankReading::Ranked(RawRank::new("DIAMOND", "IV", 0).with_record(5, 5))
        );
    }

    #[test]
    fn test_summary_unranked_shapes() {
        assert_eq!(parse_summary(&json!({})), RankReading::Unranked);
        assert_eq!(parse_summary(&json!({"data": {}})), RankReading::Unranked);
        assert_eq!(
            parse_summary(&json!({"data": {"league_stats": [
                {"queue_info": {"game_type": "SOLORANKED"}, "tier_info": {"tier": null}}
            ]}})),
            RankReading::Unranked
        );
    }

    #[test]
    fn test_tier_history_entries() {
        let payload = json!({"data": [
            {"created_at": "2024-05-01T12:00:00Z", "tier_info": {"tier": "GOLD", "division": 3, "lp": 20}},
            {"created_at": "2024-05-02T12:00:00+09:00", "tier": "GOLD", "rank": "II", "lp": 5},
            {"created_at": "not a date", "tier_info": {"tier": "GOLD", "division": 1, "lp": 5}},
            {"tier_info": {"tier": "GOLD", "division": 1, "lp": 5}},
            {"created_at": "2024-05-03T00:00:00", "tier_info": {"tier": "UNRANKED"}}
        ]});

        let history = parse_tier_history(&payload);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].rank, RawRank::new("GOLD", "III", 20));
        assert_eq!(
            history[0].observed_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(history[1].rank, RawRank::new("GOLD", "II", 5));
        assert_eq!(
            history[1].observed_at,
            Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_division_to_roman() {
        assert_eq!(division_to_roman(&json!(1)), "I");
        assert_eq!(division_to_roman(&json!(4)), "IV");
        assert_eq!(division_to_roman(&json!("2")), "II");
        assert_eq!(division_to_roman(&json!("iii")), "III");
        assert_eq!(division_to_roman(&json!(null)), "");
    }
}
