use super::{DateRange, EntryRow, UserIdentity};
use crate::errors::{AppError, AppResult};
use crate::models::{Entry, EntryPatch, Profile, ProfilePatch};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserIdentity>,
    entries: Vec<Entry>,
    profiles: HashMap<Uuid, Profile>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    requests: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as a signed-in user along with an empty profile.
    pub async fn register_user(&self, token: &str, email: Option<&str>) -> Uuid {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.get(token) {
            return user.id;
        }
        let id = Uuid::new_v4();
        tables.users.insert(
            token.to_string(),
            UserIdentity {
                id,
                email: email.map(str::to_string),
            },
        );
        tables.profiles.insert(id, Profile::empty(id));
        id
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn current_user(&self, token: &str) -> AppResult<Option<UserIdentity>> {
        self.count();
        Ok(self.tables.lock().await.users.get(token).cloned())
    }

    pub async fn list_entries(&self, token: &str, range: Option<DateRange>) -> AppResult<Vec<Entry>> {
        self.count();
        let tables = self.tables.lock().await;
        let Some(user) = tables.users.get(token) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<Entry> = tables
            .entries
            .iter()
            .filter(|entry| entry.user_id == user.id)
            .filter(|entry| match (range, entry.date) {
                (None, _) => true,
                (Some(range), Some(date)) => range.contains(date),
                (Some(_), None) => false,
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }

    pub async fn get_entry(&self, token: &str, id: Uuid) -> AppResult<Option<Entry>> {
        self.count();
        let tables = self.tables.lock().await;
        let Some(user) = tables.users.get(token) else {
            return Ok(None);
        };
        Ok(tables
            .entries
            .iter()
            .find(|entry| entry.id == id && entry.user_id == user.id)
            .cloned())
    }

    pub async fn upsert_entry(&self, token: &str, row: &EntryRow) -> AppResult<Entry> {
        self.count();
        let mut tables = self.tables.lock().await;
        let user_id = owner(&tables, token)?;
        if row.user_id != user_id {
            return Err(row_level_security());
        }

        let existing = tables
            .entries
            .iter_mut()
            .find(|entry| entry.user_id == row.user_id && entry.date == Some(row.date));

        if let Some(entry) = existing {
            entry.content = row.content.clone();
            entry.mood_score = row.mood_score;
            entry.hashtags = row.hashtags.clone();
            entry.photo_refs = row.photo_refs.clone();
            entry.updated_at = Some(row.updated_at);
            return Ok(entry.clone());
        }

        let entry = Entry {
            id: Uuid::new_v4(),
            user_id: row.user_id,
            date: Some(row.date),
            content: row.content.clone(),
            mood_score: row.mood_score,
            hashtags: row.hashtags.clone(),
            photo_refs: row.photo_refs.clone(),
            created_at: Some(Utc::now()),
            updated_at: Some(row.updated_at),
        };
        tables.entries.push(entry.clone());
        Ok(entry)
    }

    pub async fn update_entry(
        &self,
        token: &str,
        id: Uuid,
        patch: &EntryPatch,
    ) -> AppResult<Option<Entry>> {
        self.count();
        let mut tables = self.tables.lock().await;
        let user_id = owner(&tables, token)?;

        if let Some(date) = patch.date {
            let taken = tables
                .entries
                .iter()
                .any(|entry| entry.user_id == user_id && entry.id != id && entry.date == Some(date));
            if taken {
                return Err(AppError::BackendQuery(
                    "duplicate key value violates unique constraint \"entries_user_id_date_key\"".into(),
                ));
            }
        }

        let Some(entry) = tables
            .entries
            .iter_mut()
            .find(|entry| entry.id == id && entry.user_id == user_id)
        else {
            return Ok(None);
        };
        patch.apply_to(entry);
        entry.updated_at = Some(Utc::now());
        Ok(Some(entry.clone()))
    }

    pub async fn delete_entry(&self, token: &str, id: Uuid) -> AppResult<()> {
        self.count();
        let mut tables = self.tables.lock().await;
        let user_id = owner(&tables, token)?;
        tables
            .entries
            .retain(|entry| !(entry.id == id && entry.user_id == user_id));
        Ok(())
    }

    pub async fn get_profile(&self, token: &str, user_id: Uuid) -> AppResult<Option<Profile>> {
        self.count();
        let tables = self.tables.lock().await;
        match tables.users.get(token) {
            Some(user) if user.id == user_id => Ok(tables.profiles.get(&user_id).cloned()),
            _ => Ok(None),
        }
    }

    pub async fn update_profile(
        &self,
        token: &str,
        user_id: Uuid,
        patch: &ProfilePatch,
    ) -> AppResult<Option<Profile>> {
        self.count();
        let mut tables = self.tables.lock().await;
        if owner(&tables, token)? != user_id {
            return Err(row_level_security());
        }
        let Some(profile) = tables.profiles.get_mut(&user_id) else {
            return Ok(None);
        };
        if let Some(display_name) = &patch.display_name {
            profile.display_name = Some(display_name.clone());
        }
        if let Some(background_color) = &patch.background_color {
            profile.background_color = Some(background_color.clone());
        }
        Ok(Some(profile.clone()))
    }
}

fn owner(tables: &Tables, token: &str) -> AppResult<Uuid> {
    tables
        .users
        .get(token)
        .map(|user| user.id)
        .ok_or_else(row_level_security)
}

fn row_level_security() -> AppError {
    AppError::BackendQuery("new row violates row-level security policy".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(user_id: Uuid, date: NaiveDate, content: &str) -> EntryRow {
        EntryRow {
            user_id,
            date,
            content: content.into(),
            mood_score: 3,
            hashtags: vec!["x".into()],
            photo_refs: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_the_row_for_the_same_date() {
        let backend = MemoryBackend::new();
        let user = backend.register_user("t", None).await;
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let first = backend.upsert_entry("t", &row(user, date, "one")).await.unwrap();
        let second = backend.upsert_entry("t", &row(user, date, "two")).await.unwrap();

        assert_eq!(first.id, second.id);
        let all = backend.list_entries("t", None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "two");
    }

    #[tokio::test]
    async fn rows_are_scoped_to_the_token_owner() {
        let backend = MemoryBackend::new();
        let alice = backend.register_user("alice", None).await;
        backend.register_user("bob", None).await;
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let entry = backend.upsert_entry("alice", &row(alice, date, "mine")).await.unwrap();

        assert!(backend.list_entries("bob", None).await.unwrap().is_empty());
        assert!(backend.get_entry("bob", entry.id).await.unwrap().is_none());
        assert!(backend.upsert_entry("bob", &row(alice, date, "theirs")).await.is_err());
        assert!(backend.list_entries("nobody", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn moving_an_entry_onto_a_taken_date_is_rejected() {
        let backend = MemoryBackend::new();
        let user = backend.register_user("t", None).await;
        let march_1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let march_2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        backend.upsert_entry("t", &row(user, march_1, "a")).await.unwrap();
        let second = backend.upsert_entry("t", &row(user, march_2, "b")).await.unwrap();

        let patch = EntryPatch {
            date: Some(march_1),
            ..EntryPatch::default()
        };
        let err = backend.update_entry("t", second.id, &patch).await.unwrap_err();
        assert!(matches!(err, AppError::BackendQuery(_)));
    }

    #[tokio::test]
    async fn registering_creates_a_profile() {
        let backend = MemoryBackend::new();
        let user = backend.register_user("t", Some("me@example.com")).await;
        let profile = backend.get_profile("t", user).await.unwrap().unwrap();
        assert_eq!(profile.id, user);
        assert_eq!(profile.background_color, None);
        assert_eq!(backend.register_user("t", None).await, user);
    }
}
