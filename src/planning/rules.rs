//! Ordered (predicate, builder) rules for the deterministic planning paths.
//!
//! Each table is evaluated top to bottom and the first rule whose predicate holds *and* whose
//! builder produces a plan wins, so precedence is the order of the table.

use super::entities;
use super::plan::{args, ConversationContext, QueryPlan, CURRENT_WEEKEND, LAST_RACE, TOP_THREE};
use super::temporal::{self, ResolvedYear, TemporalContext};
use crate::tools::catalog::*;
use crate::tools::Arguments;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

static GREETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(hi|hello|hey|thanks|thank you|cheers|good (morning|afternoon|evening))( there| a lot| so much)?[\s!.,?]*$|^\s*(who are you|what can you do|help)\s*[?!.]*\s*$",
    )
    .unwrap()
});

static WHAT_ABOUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(what|how)\s+about\b|^\s*and\s+(what about\s+)?").unwrap());

static WHICH_RACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(what|which)\s+(race|grand prix|gp|event)\s+(was|is)\s+(this|that|it)\b").unwrap()
});

static WINNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(who\s+won|winner|won\s+the|win\s+the|victory|who\s+got\s+pole|pole\s+position|pole\s+sitter)\b").unwrap()
});

static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(championship|title|champion|world champion|standings)\b").unwrap());

static FASTEST_LAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfastest\s+lap").unwrap());

static TODAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(today'?s?|tonight'?s?|this weekend'?s?)\b").unwrap());

static COMPARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(compare|comparison|vs\.?|versus|against|head[\s-]to[\s-]head|faster|quicker|better)\b").unwrap()
});

static TOP_N: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\btop\s*(3|three)\b|\btitle\s+contenders\b|\bchampionship\s+leaders\b|\bleaders\b")
        .unwrap()
});

static STANDINGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(championship|standings|points|leader|leading|table)\b").unwrap()
});

static SCHEDULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(schedule|calendar|races|fixtures|when\s+is|next\s+race|upcoming)\b").unwrap()
});

static PERFORMANCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(stats|statistics|performance|pace|form|how\s+did|how\s+is|doing)\b").unwrap()
});

/// Everything a rule may look at, computed once per question.
#[derive(Debug, Clone)]
pub struct PlanInput<'a> {
    pub text: &'a str,
    pub lower: String,
    pub temporal: &'a TemporalContext,
    pub resolved: Option<ResolvedYear>,
    pub year: i32,
    pub drivers: Vec<String>,
    pub grand_prix: Option<String>,
    pub session: Option<&'static str>,
    pub conversation: Option<&'a ConversationContext>,
}

impl<'a> PlanInput<'a> {
    pub fn new(
        text: &'a str,
        temporal: &'a TemporalContext,
        conversation: Option<&'a ConversationContext>,
    ) -> Self {
        let resolved = temporal::resolve_year(text, temporal);
        Self {
            text,
            lower: entities::fold(text),
            temporal,
            resolved,
            year: resolved.map(|r| r.year).unwrap_or(temporal.current_year),
            drivers: entities::find_drivers(text),
            grand_prix: entities::find_grand_prix(text),
            session: session_from_text(text),
            conversation,
        }
    }

    fn session_or_race(&self) -> &'static str {
        self.session.unwrap_or("Race")
    }

    fn explicit_year(&self) -> Option<i32> {
        self.resolved
            .filter(|r| r.source == temporal::YearSource::Explicit)
            .map(|r| r.year)
    }
}

pub struct PlanRule {
    pub name: &'static str,
    pub matches: fn(&PlanInput) -> bool,
    pub build: fn(&PlanInput) -> Option<QueryPlan>,
}

/// First rule of `rules` that yields a plan.
pub fn first_match(rules: &[PlanRule], input: &PlanInput) -> Option<(&'static str, QueryPlan)> {
    rules
        .iter()
        .filter(|rule| (rule.matches)(input))
        .find_map(|rule| (rule.build)(input).map(|plan| (rule.name, plan)))
}

/// Session named in the text; `None` leaves the caller's default.
pub fn session_from_text(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let has = |needle: &str| lower.contains(needle);
    if has("sprint qualifying") || has("sprint shootout") {
        Some("Sprint Qualifying")
    } else if has("sprint") {
        Some("Sprint")
    } else if has("qualifying") || has("quali") || has("pole") {
        Some("Qualifying")
    } else if has("fp1") || has("practice 1") || has("first practice") {
        Some("FP1")
    } else if has("fp2") || has("practice 2") || has("second practice") {
        Some("FP2")
    } else if has("fp3") || has("practice 3") || has("third practice") {
        Some("FP3")
    } else {
        None
    }
}

fn year_args(year: i64) -> Arguments {
    args([("year", json!(year))])
}

fn session_args(year: i64, event: &str, session: &str) -> Arguments {
    args([
        ("year", json!(year)),
        ("event_identifier", json!(event)),
        ("session_name", json!(session)),
    ])
}

fn with(mut arguments: Arguments, key: &str, value: Value) -> Arguments {
    arguments.insert(key.to_string(), value);
    arguments
}

/// Schedule lookup followed by `follow_up_tool` against the event the placeholder selects.
fn via_schedule(
    year: i32,
    placeholder: &str,
    follow_up_tool: &str,
    follow_up: Arguments,
    reasoning: &str,
) -> QueryPlan {
    QueryPlan::new(GET_EVENT_SCHEDULE, year_args(year.into()), reasoning).with_follow_up(
        follow_up_tool,
        with(follow_up, "event_identifier", json!(placeholder)),
    )
}

// ============================================================================
// Follow-up questions answered from the conversation context
// ============================================================================

pub const FOLLOW_UP_RULES: &[PlanRule] = &[
    PlanRule {
        name: "which_race_was_this",
        matches: |i| WHICH_RACE.is_match(&i.lower),
        build: |i| {
            let ctx = i.conversation?;
            let race = ctx.last_race_name.as_deref()?;
            let year = ctx.last_year?;
            Some(QueryPlan::new(
                GET_EVENT_INFO,
                args([("year", json!(year)), ("identifier", json!(race))]),
                "Follow-up about the race discussed previously",
            ))
        },
    },
    PlanRule {
        name: "what_about_driver",
        matches: |i| WHAT_ABOUT.is_match(&i.lower) && i.drivers.len() == 1,
        build: |i| {
            let ctx = i.conversation?;
            let race = ctx.last_race_name.as_deref()?;
            let year = i.explicit_year().map(i64::from).or(ctx.last_year)?;
            let session = i
                .session
                .or(ctx.last_session.as_deref().and_then(canonical_session))
                .unwrap_or("Race");
            Some(QueryPlan::new(
                GET_DRIVER_INFO,
                with(
                    session_args(year, race, session),
                    "driver_identifier",
                    json!(i.drivers[0]),
                ),
                "Follow-up asking about another driver in the same session",
            ))
        },
    },
    PlanRule {
        name: "what_about_grand_prix",
        matches: |i| WHAT_ABOUT.is_match(&i.lower) && i.grand_prix.is_some(),
        build: |i| {
            let ctx = i.conversation?;
            let year = i.explicit_year().map(i64::from).or(ctx.last_year)?;
            let race = i.grand_prix.as_deref()?;
            let session = i
                .session
                .or(ctx.last_session.as_deref().and_then(canonical_session))
                .unwrap_or("Race");
            Some(QueryPlan::new(
                GET_SESSION_RESULTS,
                session_args(year, race, session),
                "Follow-up asking about another Grand Prix",
            ))
        },
    },
    PlanRule {
        name: "what_about_year",
        matches: |i| WHAT_ABOUT.is_match(&i.lower) && i.explicit_year().is_some(),
        build: |i| {
            let ctx = i.conversation?;
            let year = i64::from(i.explicit_year()?);
            let tool = ctx.last_tool.as_deref()?;
            let plan = match tool {
                GET_CHAMPIONSHIP_STANDINGS | GET_EVENT_SCHEDULE => {
                    QueryPlan::new(tool, year_args(year), "Same question for another season")
                }
                GET_SESSION_RESULTS => {
                    let race = ctx.last_race_name.as_deref()?;
                    let session = ctx.last_session.as_deref().unwrap_or("Race");
                    QueryPlan::new(
                        GET_SESSION_RESULTS,
                        session_args(year, race, session),
                        "Same race, another season",
                    )
                }
                _ => return None,
            };
            Some(plan)
        },
    },
];

fn canonical_session(session: &str) -> Option<&'static str> {
    session_from_text(session).or_else(|| session.eq_ignore_ascii_case("race").then_some("Race"))
}

// ============================================================================
// High-confidence patterns that must not be delegated to the oracle
// ============================================================================

pub const DETERMINISTIC_RULES: &[PlanRule] = &[
    PlanRule {
        name: "greeting",
        matches: |i| GREETING.is_match(&i.lower),
        build: |_| Some(QueryPlan::conversational("Greeting or small talk, no data needed")),
    },
    PlanRule {
        name: "most_recent_race",
        matches: |i| {
            temporal::mentions_last_race(i.text) && i.grand_prix.is_none() && i.drivers.len() < 2
        },
        build: |i| {
            let session = i.session_or_race();
            let follow_up = session_args(i.year.into(), LAST_RACE, session);
            Some(match i.drivers.first() {
                Some(driver) => via_schedule(
                    i.year,
                    LAST_RACE,
                    GET_DRIVER_INFO,
                    with(follow_up, "driver_identifier", json!(driver)),
                    "Most recent completed race, resolved from the schedule, for one driver",
                ),
                None => via_schedule(
                    i.year,
                    LAST_RACE,
                    GET_SESSION_RESULTS,
                    follow_up,
                    "Most recent completed race, resolved from the schedule",
                ),
            })
        },
    },
    PlanRule {
        name: "todays_session",
        matches: |i| {
            TODAY.is_match(&i.lower)
                && i.grand_prix.is_none()
                && (i.session.is_some() || i.lower.contains("race") || i.lower.contains("result"))
        },
        build: |i| {
            let year = i.explicit_year().unwrap_or(i.temporal.current_year);
            let session = i.session_or_race();
            Some(via_schedule(
                year,
                CURRENT_WEEKEND,
                GET_SESSION_RESULTS,
                session_args(year.into(), CURRENT_WEEKEND, session),
                "Session of the current race weekend, resolved from the schedule",
            ))
        },
    },
    PlanRule {
        name: "winner",
        matches: |i| WINNER.is_match(&i.lower),
        build: |i| {
            let session = i.session_or_race();
            if let Some(race) = &i.grand_prix {
                return Some(QueryPlan::new(
                    GET_SESSION_RESULTS,
                    session_args(i.year.into(), race, session),
                    format!("Winner of the {} {} {}", i.year, race, session),
                ));
            }
            if TITLE.is_match(&i.lower) {
                return Some(QueryPlan::new(
                    GET_CHAMPIONSHIP_STANDINGS,
                    year_args(i.year.into()),
                    "Championship winner or leader",
                ));
            }
            Some(via_schedule(
                i.year,
                LAST_RACE,
                GET_SESSION_RESULTS,
                session_args(i.year.into(), LAST_RACE, session),
                "Winner without a named race means the most recent completed one",
            ))
        },
    },
    PlanRule {
        name: "fastest_lap",
        matches: |i| FASTEST_LAP.is_match(&i.lower),
        build: |i| {
            let session = i.session_or_race();
            match (&i.grand_prix, i.drivers.first()) {
                (Some(race), Some(driver)) => Some(QueryPlan::new(
                    GET_TELEMETRY,
                    with(
                        session_args(i.year.into(), race, session),
                        "driver_identifier",
                        json!(driver),
                    ),
                    "Fastest lap telemetry of one driver",
                )),
                (Some(race), None) => Some(QueryPlan::new(
                    GET_SESSION_RESULTS,
                    session_args(i.year.into(), race, session),
                    "Fastest lap from the session classification",
                )),
                (None, _) => Some(via_schedule(
                    i.year,
                    LAST_RACE,
                    GET_SESSION_RESULTS,
                    session_args(i.year.into(), LAST_RACE, session),
                    "Fastest lap of the most recent completed race",
                )),
            }
        },
    },
    PlanRule {
        name: "driver_comparison",
        matches: |i| COMPARE.is_match(&i.lower) && (i.drivers.len() >= 2 || TOP_N.is_match(&i.lower)),
        build: |i| {
            let drivers = if i.drivers.len() >= 2 {
                i.drivers.join(",")
            } else {
                TOP_THREE.to_string()
            };
            let event = i.grand_prix.clone().unwrap_or_else(|| LAST_RACE.to_string());
            let follow_up = with(
                session_args(i.year.into(), &event, i.session_or_race()),
                "drivers",
                json!(drivers),
            );
            Some(
                QueryPlan::new(
                    GET_CHAMPIONSHIP_STANDINGS,
                    year_args(i.year.into()),
                    "Driver comparison anchored on the championship standings",
                )
                .with_follow_up(COMPARE_DRIVERS, follow_up),
            )
        },
    },
];

// ============================================================================
// Keyword fallback used when no oracle is available or its answer is unusable
// ============================================================================

pub const FALLBACK_RULES: &[PlanRule] = &[
    PlanRule {
        name: "standings_keywords",
        matches: |i| STANDINGS.is_match(&i.lower),
        build: |i| {
            Some(QueryPlan::new(
                GET_CHAMPIONSHIP_STANDINGS,
                year_args(i.year.into()),
                "Keyword match: championship standings",
            ))
        },
    },
    PlanRule {
        name: "schedule_keywords",
        matches: |i| SCHEDULE.is_match(&i.lower),
        build: |i| {
            Some(QueryPlan::new(
                GET_EVENT_SCHEDULE,
                year_args(i.year.into()),
                "Keyword match: season schedule",
            ))
        },
    },
    PlanRule {
        name: "driver_performance",
        matches: |i| i.drivers.len() == 1 && PERFORMANCE.is_match(&i.lower),
        build: |i| {
            let event = i.grand_prix.clone().unwrap_or_else(|| LAST_RACE.to_string());
            let follow_up = with(
                session_args(i.year.into(), &event, i.session_or_race()),
                "driver_identifier",
                json!(i.drivers[0]),
            );
            Some(
                QueryPlan::new(
                    GET_CHAMPIONSHIP_STANDINGS,
                    year_args(i.year.into()),
                    "Driver performance with championship context",
                )
                .with_follow_up(ANALYZE_DRIVER_PERFORMANCE, follow_up),
            )
        },
    },
    PlanRule {
        name: "driver_at_grand_prix",
        matches: |i| i.drivers.len() == 1 && i.grand_prix.is_some(),
        build: |i| {
            let race = i.grand_prix.as_deref()?;
            Some(QueryPlan::new(
                GET_DRIVER_INFO,
                with(
                    session_args(i.year.into(), race, i.session_or_race()),
                    "driver_identifier",
                    json!(i.drivers[0]),
                ),
                "Keyword match: one driver at a named Grand Prix",
            ))
        },
    },
    PlanRule {
        name: "grand_prix_results",
        matches: |i| i.grand_prix.is_some(),
        build: |i| {
            let race = i.grand_prix.as_deref()?;
            Some(QueryPlan::new(
                GET_SESSION_RESULTS,
                session_args(i.year.into(), race, i.session_or_race()),
                "Keyword match: results of a named Grand Prix",
            ))
        },
    },
];

/// The plan of last resort: standings for the resolved (or current) year.
pub fn default_plan(input: &PlanInput) -> QueryPlan {
    QueryPlan::new(
        GET_CHAMPIONSHIP_STANDINGS,
        year_args(input.year.into()),
        "No specific pattern matched; defaulting to championship standings",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn temporal() -> TemporalContext {
        TemporalContext::from_date(NaiveDate::from_ymd_opt(2025, 8, 10).unwrap())
    }

    fn deterministic(text: &str) -> Option<(&'static str, QueryPlan)> {
        let t = temporal();
        let input = PlanInput::new(text, &t, None);
        first_match(DETERMINISTIC_RULES, &input)
    }

    #[test]
    fn test_winner_with_named_grand_prix() {
        let (name, plan) = deterministic("Who won the 2023 British Grand Prix?").unwrap();
        assert_eq!(name, "winner");
        assert_eq!(plan.tool, GET_SESSION_RESULTS);
        assert_eq!(plan.arguments, session_args(2023, "British Grand Prix", "Race"));
        assert!(plan.follow_up.is_none());
    }

    #[test]
    fn test_most_recent_race_goes_through_schedule() {
        let (name, plan) = deterministic("results of the most recent race weekend").unwrap();
        assert_eq!(name, "most_recent_race");
        assert_eq!(plan.tool, GET_EVENT_SCHEDULE);
        assert_eq!(plan.arguments["year"], 2025);
        let follow_up = plan.follow_up.unwrap();
        assert_eq!(follow_up.tool, GET_SESSION_RESULTS);
        assert_eq!(follow_up.arguments["event_identifier"], LAST_RACE);
    }

    #[test]
    fn test_most_recent_race_beats_winner_rule() {
        let (name, _) = deterministic("who won the last race?").unwrap();
        assert_eq!(name, "most_recent_race");
    }

    #[test]
    fn test_todays_qualifying() {
        let (name, plan) = deterministic("today's qualifying results").unwrap();
        assert_eq!(name, "todays_session");
        let follow_up = plan.follow_up.unwrap();
        assert_eq!(follow_up.arguments["session_name"], "Qualifying");
        assert_eq!(follow_up.arguments["event_identifier"], CURRENT_WEEKEND);
    }

    #[test]
    fn test_championship_winner() {
        let (_, plan) = deterministic("who won the 2021 championship").unwrap();
        assert_eq!(plan.tool, GET_CHAMPIONSHIP_STANDINGS);
        assert_eq!(plan.arguments["year"], 2021);
    }

    #[test]
    fn test_fastest_lap_with_driver() {
        let (name, plan) = deterministic("Verstappen fastest lap at Monza 2024").unwrap();
        assert_eq!(name, "fastest_lap");
        assert_eq!(plan.tool, GET_TELEMETRY);
        assert_eq!(plan.arguments["driver_identifier"], "VER");
        assert_eq!(plan.arguments["event_identifier"], "Italian Grand Prix");
    }

    #[test]
    fn test_comparison_uses_codes() {
        let (name, plan) = deterministic("compare Verstappen and Norris").unwrap();
        assert_eq!(name, "driver_comparison");
        let follow_up = plan.follow_up.unwrap();
        assert_eq!(follow_up.tool, COMPARE_DRIVERS);
        assert_eq!(follow_up.arguments["drivers"], "VER,NOR");
    }

    #[test]
    fn test_comparison_of_top_three_uses_placeholder() {
        let (_, plan) = deterministic("compare the top 3 drivers").unwrap();
        assert_eq!(plan.follow_up.unwrap().arguments["drivers"], TOP_THREE);
    }

    #[test]
    fn test_greeting() {
        let (_, plan) = deterministic("Hello there!").unwrap();
        assert!(plan.is_conversational());
        assert!(deterministic("hello, who leads the championship?").is_none());
    }

    #[test]
    fn test_no_deterministic_match() {
        assert!(deterministic("what's the championship standings").is_none());
    }

    #[test]
    fn test_fallback_rules() {
        let t = temporal();
        let input = PlanInput::new("what's the championship standings", &t, None);
        let (name, plan) = first_match(FALLBACK_RULES, &input).unwrap();
        assert_eq!(name, "standings_keywords");
        assert_eq!(plan.arguments, year_args(2025));

        let input = PlanInput::new("show me the 2024 calendar", &t, None);
        let (_, plan) = first_match(FALLBACK_RULES, &input).unwrap();
        assert_eq!(plan.tool, GET_EVENT_SCHEDULE);
        assert_eq!(plan.arguments["year"], 2024);

        let input = PlanInput::new("Leclerc stats", &t, None);
        let (_, plan) = first_match(FALLBACK_RULES, &input).unwrap();
        assert_eq!(plan.follow_up.unwrap().tool, ANALYZE_DRIVER_PERFORMANCE);

        let input = PlanInput::new("tell me something", &t, None);
        assert!(first_match(FALLBACK_RULES, &input).is_none());
        assert_eq!(default_plan(&input).tool, GET_CHAMPIONSHIP_STANDINGS);
    }

    #[test]
    fn test_follow_up_rules_need_context() {
        let t = temporal();
        let input = PlanInput::new("what about Norris?", &t, None);
        assert!(first_match(FOLLOW_UP_RULES, &input).is_none());

        let ctx = ConversationContext {
            last_year: Some(2024),
            last_race_name: Some("Belgian Grand Prix".to_string()),
            last_driver_code: Some("HAM".to_string()),
            last_tool: Some(GET_SESSION_RESULTS.to_string()),
            last_session: Some("Race".to_string()),
        };
        let input = PlanInput::new("what about Norris?", &t, Some(&ctx));
        let (name, plan) = first_match(FOLLOW_UP_RULES, &input).unwrap();
        assert_eq!(name, "what_about_driver");
        assert_eq!(plan.tool, GET_DRIVER_INFO);
        assert_eq!(plan.arguments["driver_identifier"], "NOR");
        assert_eq!(plan.arguments["event_identifier"], "Belgian Grand Prix");
        assert_eq!(plan.arguments["year"], 2024);

        let input = PlanInput::new("what race was this?", &t, Some(&ctx));
        let (_, plan) = first_match(FOLLOW_UP_RULES, &input).unwrap();
        assert_eq!(plan.tool, GET_EVENT_INFO);
        assert_eq!(plan.arguments["identifier"], "Belgian Grand Prix");

        let input = PlanInput::new("how about 2022?", &t, Some(&ctx));
        let (_, plan) = first_match(FOLLOW_UP_RULES, &input).unwrap();
        assert_eq!(plan.arguments, session_args(2022, "Belgian Grand Prix", "Race"));
    }
}
