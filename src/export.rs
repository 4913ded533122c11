use crate::models::{Entry, date_key};
use chrono::NaiveDate;

pub fn export_entries(entries: &[Entry]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(entries)
}

pub fn export_file_name(today: NaiveDate) -> String {
    format!("journal-export-{}.json", date_key(today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn export_is_a_pretty_json_array() {
        let entry = Entry {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1),
            content: "hi".into(),
            mood_score: 5,
            hashtags: vec!["x".into()],
            photo_refs: Vec::new(),
            created_at: None,
            updated_at: None,
        };

        let json = export_entries(&[entry.clone()]).unwrap();
        assert!(json.starts_with("[\n"));
        let parsed: Vec<Entry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vec![entry]);
    }

    #[test]
    fn file_name_carries_the_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_file_name(day), "journal-export-2024-03-09.json");
    }
}
