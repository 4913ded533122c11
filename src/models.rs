use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// One journal record for a single calendar date.
///
/// Rows are read leniently: a null or malformed `date` becomes `None` and
/// null columns fall back to their defaults, so one bad row never fails a
/// whole listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default, deserialize_with = "lenient_date")]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mood_score: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hashtags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub photo_refs: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn date_key(&self) -> Option<String> {
        self.date.map(date_key)
    }
}

/// Data submitted from the entry form. A missing date means today.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryDraft {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub content: String,
    pub mood_score: i32,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_refs: Option<Vec<String>>,
}

impl EntryPatch {
    pub fn apply_to(&self, entry: &mut Entry) {
        if let Some(date) = self.date {
            entry.date = Some(date);
        }
        if let Some(content) = &self.content {
            entry.content = content.clone();
        }
        if let Some(mood_score) = self.mood_score {
            entry.mood_score = mood_score;
        }
        if let Some(hashtags) = &self.hashtags {
            entry.hashtags = hashtags.clone();
        }
        if let Some(photo_refs) = &self.photo_refs {
            entry.photo_refs = photo_refs.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
}

impl Profile {
    pub fn empty(id: Uuid) -> Self {
        Self {
            id,
            username: None,
            avatar_url: None,
            display_name: None,
            background_color: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Accepts a bare `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_date_key(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|stamp| stamp.date_naive())
    })
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_date_key))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_row_with_nulls_reads_as_defaults() {
        let row = serde_json::json!({
            "id": "6f2c1d7e-3a43-4a8e-9a53-0c6f1f7a2b11",
            "user_id": "0b6d9a9e-9d8c-4a07-8a43-3c1c0d6b1e22",
            "date": null,
            "content": null,
            "mood_score": null,
            "hashtags": null
        });

        let entry: Entry = serde_json::from_value(row).unwrap();
        assert_eq!(entry.date, None);
        assert_eq!(entry.content, "");
        assert_eq!(entry.mood_score, 0);
        assert!(entry.hashtags.is_empty());
        assert!(entry.photo_refs.is_empty());
    }

    #[test]
    fn malformed_date_is_treated_as_missing() {
        let row = serde_json::json!({
            "id": "6f2c1d7e-3a43-4a8e-9a53-0c6f1f7a2b11",
            "user_id": "0b6d9a9e-9d8c-4a07-8a43-3c1c0d6b1e22",
            "date": "not a date",
            "content": "x",
            "mood_score": 3
        });

        let entry: Entry = serde_json::from_value(row).unwrap();
        assert_eq!(entry.date, None);
        assert_eq!(entry.date_key(), None);
    }

    #[test]
    fn timestamp_dates_keep_their_calendar_day() {
        assert_eq!(
            parse_date_key("2024-03-01T10:15:00+00:00"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_date_key("2024-02-30"), None);
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let mut entry: Entry = serde_json::from_value(serde_json::json!({
            "id": "6f2c1d7e-3a43-4a8e-9a53-0c6f1f7a2b11",
            "user_id": "0b6d9a9e-9d8c-4a07-8a43-3c1c0d6b1e22",
            "date": "2024-03-01",
            "content": "before",
            "mood_score": 2,
            "hashtags": ["a"]
        }))
        .unwrap();

        let patch = EntryPatch {
            content: Some("after".into()),
            ..EntryPatch::default()
        };
        patch.apply_to(&mut entry);

        assert_eq!(entry.content, "after");
        assert_eq!(entry.mood_score, 2);
        assert_eq!(entry.hashtags, vec!["a".to_string()]);
    }
}
