pub mod memory;
pub mod rest;

use crate::errors::AppResult;
use crate::models::{Entry, EntryPatch, Profile, ProfilePatch};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Insert-or-replace payload for the `entries` table.
#[derive(Debug, Clone, Serialize)]
pub struct EntryRow {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub content: String,
    pub mood_score: i32,
    pub hashtags: Vec<String>,
    pub photo_refs: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Inclusive calendar-date filter on `entries.date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn year(year: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

pub enum Backend {
    Rest(RestBackend),
    Memory(MemoryBackend),
}

impl Backend {
    pub async fn current_user(&self, token: &str) -> AppResult<Option<UserIdentity>> {
        match self {
            Backend::Rest(rest) => rest.current_user(token).await,
            Backend::Memory(memory) => memory.current_user(token).await,
        }
    }

    pub async fn list_entries(&self, token: &str, range: Option<DateRange>) -> AppResult<Vec<Entry>> {
        match self {
            Backend::Rest(rest) => rest.list_entries(token, range).await,
            Backend::Memory(memory) => memory.list_entries(token, range).await,
        }
    }

    pub async fn get_entry(&self, token: &str, id: Uuid) -> AppResult<Option<Entry>> {
        match self {
            Backend::Rest(rest) => rest.get_entry(token, id).await,
            Backend::Memory(memory) => memory.get_entry(token, id).await,
        }
    }

    pub async fn upsert_entry(&self, token: &str, row: &EntryRow) -> AppResult<Entry> {
        match self {
            Backend::Rest(rest) => rest.upsert_entry(token, row).await,
            Backend::Memory(memory) => memory.upsert_entry(token, row).await,
        }
    }

    pub async fn update_entry(
        &self,
        token: &str,
        id: Uuid,
        patch: &EntryPatch,
    ) -> AppResult<Option<Entry>> {
        match self {
            Backend::Rest(rest) => rest.update_entry(token, id, patch).await,
            Backend::Memory(memory) => memory.update_entry(token, id, patch).await,
        }
    }

    pub async fn delete_entry(&self, token: &str, id: Uuid) -> AppResult<()> {
        match self {
            Backend::Rest(rest) => rest.delete_entry(token, id).await,
            Backend::Memory(memory) => memory.delete_entry(token, id).await,
        }
    }

    pub async fn get_profile(&self, token: &str, user_id: Uuid) -> AppResult<Option<Profile>> {
        match self {
            Backend::Rest(rest) => rest.get_profile(token, user_id).await,
            Backend::Memory(memory) => memory.get_profile(token, user_id).await,
        }
    }

    pub async fn update_profile(
        &self,
        token: &str,
        user_id: Uuid,
        patch: &ProfilePatch,
    ) -> AppResult<Option<Profile>> {
        match self {
            Backend::Rest(rest) => rest.update_profile(token, user_id, patch).await,
            Backend::Memory(memory) => memory.update_profile(token, user_id, patch).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_is_inclusive_on_both_ends() {
        let range = DateRange::year(2023).unwrap();
        assert!(range.contains(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2022, 12, 31).unwrap()));
    }
}
