use crate::calendar;
use crate::models::{Entry, date_key};
use crate::mood;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

const WEEK_COUNT: usize = 8;
const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Serialize)]
pub struct WeekdayPoint {
    pub day: &'static str,
    pub average: f64,
    pub count: u32,
    pub color: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub mood_score: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct WeeklyAveragePoint {
    pub week: String,
    pub start_date: String,
    pub end_date: String,
    pub days_logged: u8,
    pub average: f64,
}

#[derive(Debug, Serialize)]
pub struct TrendsResponse {
    pub total_entries: usize,
    pub overall_average: f64,
    pub dominant_mood: i32,
    pub dominant_color: &'static str,
    pub by_weekday: Vec<WeekdayPoint>,
    pub last_7_days: Vec<DailyPoint>,
    pub weekly_averages: Vec<WeeklyAveragePoint>,
}

pub fn build_trends(entries: &[Entry]) -> TrendsResponse {
    build_trends_at(calendar::today(), entries)
}

pub fn build_trends_at(today: NaiveDate, entries: &[Entry]) -> TrendsResponse {
    let overall_average = if entries.is_empty() {
        0.0
    } else {
        entries.iter().map(|entry| f64::from(entry.mood_score)).sum::<f64>() / entries.len() as f64
    };

    let mut totals = [(0i64, 0u32); 7];
    let mut by_date = HashMap::new();
    for entry in entries {
        let Some(date) = entry.date else {
            continue;
        };
        let slot = &mut totals[date.weekday().num_days_from_sunday() as usize];
        slot.0 += i64::from(entry.mood_score);
        slot.1 += 1;
        by_date.insert(date, entry.mood_score);
    }

    let by_weekday = WEEKDAY_NAMES
        .into_iter()
        .zip(totals)
        .map(|(day, (sum, count))| {
            let average = if count > 0 { sum as f64 / f64::from(count) } else { 0.0 };
            WeekdayPoint {
                day,
                average,
                count,
                color: mood::color_for_average(if count > 0 { average } else { 3.0 }),
            }
        })
        .collect();

    let last_7_days = (0..7)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            DailyPoint {
                date: date_key(date),
                mood_score: by_date.get(&date).copied(),
            }
        })
        .collect();

    let current_week_start = week_start(today);
    let mut weekly_averages = Vec::with_capacity(WEEK_COUNT);
    for offset in (0..WEEK_COUNT).rev() {
        let start = current_week_start - Duration::weeks(offset as i64);
        let end = start + Duration::days(6);

        let mut sum = 0i64;
        let mut days_logged = 0u8;
        for day_offset in 0..7 {
            if let Some(score) = by_date.get(&(start + Duration::days(day_offset))) {
                sum += i64::from(*score);
                days_logged += 1;
            }
        }

        let denom = if days_logged == 0 { 1.0 } else { f64::from(days_logged) };
        weekly_averages.push(WeeklyAveragePoint {
            week: week_label(start),
            start_date: date_key(start),
            end_date: date_key(end),
            days_logged,
            average: sum as f64 / denom,
        });
    }

    let dominant_mood = overall_average.round() as i32;
    TrendsResponse {
        total_entries: entries.len(),
        overall_average,
        dominant_mood,
        dominant_color: mood::color_for_average(overall_average),
        by_weekday,
        last_7_days,
        weekly_averages,
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(date: Option<NaiveDate>, mood_score: i32) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            date,
            content: "x".into(),
            mood_score,
            hashtags: Vec::new(),
            photo_refs: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn empty_journal_has_zeroed_trends() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let trends = build_trends_at(today, &[]);
        assert_eq!(trends.total_entries, 0);
        assert_eq!(trends.overall_average, 0.0);
        assert_eq!(trends.by_weekday.len(), 7);
        assert!(trends.by_weekday.iter().all(|point| point.count == 0));
        assert_eq!(trends.last_7_days.len(), 7);
        assert_eq!(trends.weekly_averages.len(), 8);
    }

    #[test]
    fn weekday_averages_start_on_sunday() {
        // 2026-01-04 is a Sunday, 2026-01-05 a Monday.
        let sunday = NaiveDate::from_ymd_opt(2026, 1, 4).unwrap();
        let monday = sunday + Duration::days(1);
        let entries = vec![
            entry(Some(sunday), 2),
            entry(Some(sunday - Duration::weeks(1)), 4),
            entry(Some(monday), 5),
            entry(None, 1),
        ];

        let trends = build_trends_at(monday, &entries);
        assert_eq!(trends.by_weekday[0].day, "Sun");
        assert_eq!(trends.by_weekday[0].count, 2);
        assert_eq!(trends.by_weekday[0].average, 3.0);
        assert_eq!(trends.by_weekday[1].average, 5.0);
        assert_eq!(trends.total_entries, 4);
        assert_eq!(trends.overall_average, 3.0);
        assert_eq!(trends.dominant_mood, 3);
    }

    #[test]
    fn last_seven_days_mark_missing_days() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let two_days_ago = today - Duration::days(2);
        let trends = build_trends_at(today, &[entry(Some(two_days_ago), 4)]);

        let point = trends
            .last_7_days
            .iter()
            .find(|day| day.date == date_key(two_days_ago))
            .expect("missing day");
        assert_eq!(point.mood_score, Some(4));
        assert_eq!(trends.last_7_days.last().unwrap().mood_score, None);
    }

    #[test]
    fn weekly_averages_only_count_logged_days() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let entries = vec![entry(Some(monday), 2), entry(Some(monday + Duration::days(1)), 5)];

        let trends = build_trends_at(today, &entries);
        let current = trends.weekly_averages.last().unwrap();
        assert_eq!(current.start_date, "2026-01-05");
        assert_eq!(current.days_logged, 2);
        assert_eq!(current.average, 3.5);
        assert_eq!(current.week, "2026-W02");
    }

    #[test]
    fn last_seven_days_end_on_the_calendar_today() {
        let trends = build_trends(&[entry(Some(calendar::today()), 5)]);
        let last = trends.last_7_days.last().unwrap();
        assert_eq!(last.date, date_key(calendar::today()));
        assert_eq!(last.mood_score, Some(5));
    }
}
