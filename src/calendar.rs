use crate::models::{Entry, date_key};
use crate::mood;
use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub fn build_month_days(reference: Option<NaiveDate>) -> Vec<NaiveDate> {
    month_days(reference.unwrap_or_else(today))
}

pub fn month_days(reference: NaiveDate) -> Vec<NaiveDate> {
    let first = first_of_month(reference);
    first
        .iter_days()
        .take_while(|day| day.month() == first.month())
        .collect()
}

pub fn index_entries_by_date(entries: &[Entry]) -> HashMap<String, &Entry> {
    let mut map = HashMap::with_capacity(entries.len());
    for entry in entries {
        if let Some(key) = entry.date_key() {
            map.insert(key, entry);
        }
    }
    map
}

/// Blank cells before day one so columns line up, Sunday first.
pub fn leading_blank_count(first_day_of_month: NaiveDate) -> u32 {
    first_day_of_month.weekday().num_days_from_sunday()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayTarget {
    Edit(Uuid),
    Create(NaiveDate),
}

impl DayTarget {
    pub fn href(&self) -> String {
        match self {
            DayTarget::Edit(id) => format!("/entry/{id}"),
            DayTarget::Create(date) => format!("/entry?date={}", date_key(*date)),
        }
    }
}

pub fn on_day_click(date: NaiveDate, entry: Option<&Entry>) -> DayTarget {
    match entry {
        Some(entry) => DayTarget::Edit(entry.id),
        None => DayTarget::Create(date),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthCursor {
    year: i32,
    month: u32,
}

impl MonthCursor {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses `YYYY-MM`.
    pub fn parse(value: &str) -> Option<Self> {
        let (year, month) = value.trim().split_once('-')?;
        let year = year.parse().ok()?;
        let month = month.parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, 1).map(Self::containing)
    }

    pub fn resolve(requested: Option<&str>, today: NaiveDate) -> Self {
        let current = Self::containing(today);
        requested
            .and_then(Self::parse)
            .filter(|cursor| *cursor <= current)
            .unwrap_or(current)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_else(|| first_of_month(today()))
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self, today: NaiveDate) -> Option<Self> {
        let next = if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        };
        (next <= Self::containing(today)).then_some(next)
    }

    pub fn label(&self) -> String {
        self.first_day().format("%B %Y").to_string()
    }
}

impl fmt::Display for MonthCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCell {
    pub date: String,
    pub day: u32,
    pub entry_id: Option<Uuid>,
    pub mood_score: Option<i32>,
    pub color: &'static str,
    pub glyph: Option<&'static str>,
    pub is_today: bool,
    pub href: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthGrid {
    pub month: String,
    pub label: String,
    pub previous: String,
    pub next: Option<String>,
    pub leading_blanks: u32,
    pub hearts: bool,
    pub cells: Vec<DayCell>,
}

pub fn build_month_grid(cursor: MonthCursor, entries: &[Entry], today: NaiveDate) -> MonthGrid {
    let days = month_days(cursor.first_day());
    let by_date = index_entries_by_date(entries);

    let cells = days
        .iter()
        .map(|day| {
            let key = date_key(*day);
            let entry = by_date.get(&key).copied();
            DayCell {
                day: day.day(),
                entry_id: entry.map(|entry| entry.id),
                mood_score: entry.map(|entry| entry.mood_score),
                color: entry.map_or(mood::NEUTRAL_COLOR, |entry| mood::color_for(entry.mood_score)),
                glyph: entry.map(|entry| mood::glyph_for(entry.mood_score)),
                is_today: *day == today,
                href: on_day_click(*day, entry).href(),
                date: key,
            }
        })
        .collect();

    MonthGrid {
        month: cursor.to_string(),
        label: cursor.label(),
        previous: cursor.previous().to_string(),
        next: cursor.next(today).map(|next| next.to_string()),
        leading_blanks: days.first().map_or(0, |first| leading_blank_count(*first)),
        hearts: is_valentine_week(today),
        cells,
    }
}

/// February 9 through 15, when the grid draws hearts instead of squares.
pub fn is_valentine_week(today: NaiveDate) -> bool {
    today.month() == 2 && (9..=15).contains(&today.day())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
