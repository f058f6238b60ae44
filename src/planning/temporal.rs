//! Temporal resolution: explicit years, relative race references and seasonal references,
//! anchored on the current date.

use crate::execution::payload::ScheduleEvent;
use chrono::{Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Seasons open in March; before that "the last race" belongs to the previous season.
pub const SEASON_START_MONTH: u32 = 3;

/// Days before race day that still count as the race weekend.
const WEEKEND_SPAN_DAYS: i64 = 3;

static EXPLICIT_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());

static NEXT_RACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(next|upcoming|coming)\s+(race|grand prix|gp|weekend|round|event)").unwrap()
});

static LAST_RACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(last|previous|most recent|latest|recent)\s+(completed\s+)?(race|grand prix|gp|weekend|round|event)",
    )
    .unwrap()
});

static CURRENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(current|this)\s+(season|year|championship)\b|\bright now\b|\bnow\b").unwrap());

static PREVIOUS_SEASON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(last|previous|past)\s+(season|year)\b").unwrap());

static NEXT_SEASON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(next|upcoming|coming)\s+(season|year)\b").unwrap());

/// Wall-clock source, injectable for tests.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalContext {
    pub current_year: i32,
    pub current_month: u32,
    pub current_day: u32,
}

impl TemporalContext {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            current_year: date.year(),
            current_month: date.month(),
            current_day: date.day(),
        }
    }

    pub fn now(clock: &dyn Clock) -> Self {
        Self::from_date(clock.today())
    }

    /// Re-read the clock in place.
    pub fn refresh(&mut self, clock: &dyn Clock) {
        *self = Self::now(clock);
    }

    pub fn today(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.current_year, self.current_month, self.current_day)
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(self.current_year, 1, 1).unwrap_or_default())
    }

    pub fn season_started(&self) -> bool {
        self.current_month >= SEASON_START_MONTH
    }
}

/// Which rule produced a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearSource {
    Explicit,
    NextRace,
    LastRace,
    Current,
    PreviousSeason,
    NextSeason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedYear {
    pub year: i32,
    pub source: YearSource,
}

/// Resolve the year a question is about. `None` means no temporal opinion.
pub fn resolve_year(text: &str, ctx: &TemporalContext) -> Option<ResolvedYear> {
    if let Some(year) = explicit_year(text) {
        return Some(ResolvedYear {
            year,
            source: YearSource::Explicit,
        });
    }

    let lower = text.to_lowercase();
    let current = ctx.current_year;

    let (year, source) = if NEXT_RACE.is_match(&lower) {
        (current, YearSource::NextRace)
    } else if LAST_RACE.is_match(&lower) {
        let year = if ctx.season_started() { current } else { current - 1 };
        (year, YearSource::LastRace)
    } else if CURRENT.is_match(&lower) {
        (current, YearSource::Current)
    } else if PREVIOUS_SEASON.is_match(&lower) {
        (current - 1, YearSource::PreviousSeason)
    } else if NEXT_SEASON.is_match(&lower) {
        (current + 1, YearSource::NextSeason)
    } else {
        return None;
    };

    Some(ResolvedYear { year, source })
}

/// First `19xx`/`20xx` token in the text.
pub fn explicit_year(text: &str) -> Option<i32> {
    EXPLICIT_YEAR
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn mentions_last_race(text: &str) -> bool {
    LAST_RACE.is_match(&text.to_lowercase())
}

pub fn mentions_next_race(text: &str) -> bool {
    NEXT_RACE.is_match(&text.to_lowercase())
}

/// The chronologically last championship event strictly before `today`.
///
/// Testing and cancelled events are skipped; sprint weekends count. Events without a date
/// cannot be placed in time and are ignored.
pub fn last_completed_event<'a>(
    events: &'a [ScheduleEvent],
    today: NaiveDate,
) -> Option<&'a ScheduleEvent> {
    events
        .iter()
        .filter(|e| !e.is_non_race() && !e.is_cancelled())
        .filter(|e| e.date.map(|d| d < today).unwrap_or(false))
        .max_by_key(|e| e.date)
}

/// The event whose race day falls within the current weekend, else the last completed one.
pub fn current_weekend_event<'a>(
    events: &'a [ScheduleEvent],
    today: NaiveDate,
) -> Option<&'a ScheduleEvent> {
    events
        .iter()
        .filter(|e| !e.is_non_race() && !e.is_cancelled())
        .find(|e| {
            e.date
                .map(|d| {
                    let days_ahead = (d - today).num_days();
                    (0..=WEEKEND_SPAN_DAYS).contains(&days_ahead)
                })
                .unwrap_or(false)
        })
        .or_else(|| last_completed_event(events, today))
}

/// The first championship event on or after `today`.
pub fn next_event<'a>(events: &'a [ScheduleEvent], today: NaiveDate) -> Option<&'a ScheduleEvent> {
    events
        .iter()
        .filter(|e| !e.is_non_race() && !e.is_cancelled())
        .filter(|e| e.date.map(|d| d >= today).unwrap_or(false))
        .min_by_key(|e| e.date)
}
