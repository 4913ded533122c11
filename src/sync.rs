use crate::backend::{Backend, DateRange, EntryRow};
use crate::calendar;
use crate::errors::{AppError, AppResult};
use crate::hashtags;
use crate::models::{Entry, EntryDraft, EntryPatch, Profile, ProfilePatch};
use crate::session::AuthUser;
use crate::theme;
use chrono::Utc;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub const NEW_ENTRY_ID: &str = "new";

pub const CACHE_TTL: Duration = Duration::from_secs(30);

struct Cached<T> {
    stored_at: Instant,
    value: T,
}

struct QueryCache {
    ttl: Duration,
    generations: HashMap<Uuid, u64>,
    lists: HashMap<(Uuid, Option<i32>), Cached<Vec<Entry>>>,
    entries: HashMap<(Uuid, Uuid), Cached<Entry>>,
    profiles: HashMap<Uuid, Cached<Option<Profile>>>,
}

impl QueryCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generations: HashMap::new(),
            lists: HashMap::new(),
            entries: HashMap::new(),
            profiles: HashMap::new(),
        }
    }

    fn generation(&self, user_id: Uuid) -> u64 {
        self.generations.get(&user_id).copied().unwrap_or(0)
    }

    /// Drops the user's lists; reads that started earlier will not store theirs.
    fn invalidate_user(&mut self, user_id: Uuid) {
        *self.generations.entry(user_id).or_default() += 1;
        self.lists.retain(|(owner, _), _| *owner != user_id);
    }

    fn store_list(&mut self, key: (Uuid, Option<i32>), generation: u64, entries: Vec<Entry>) {
        if self.generation(key.0) != generation {
            debug!(user = %key.0, "entry list changed while loading, not caching");
            return;
        }
        self.lists.insert(key, cached(entries));
    }

    fn store_entry(&mut self, key: (Uuid, Uuid), generation: u64, entry: Entry) {
        if self.generation(key.0) == generation {
            self.entries.insert(key, cached(entry));
        }
    }
}

fn cached<T>(value: T) -> Cached<T> {
    Cached {
        stored_at: Instant::now(),
        value,
    }
}

fn fresh<K: Eq + Hash, T: Clone>(map: &mut HashMap<K, Cached<T>>, key: &K, ttl: Duration) -> Option<T> {
    let hit = map.get(key)?;
    if hit.stored_at.elapsed() < ttl {
        return Some(hit.value.clone());
    }
    map.remove(key);
    None
}

pub struct EntrySync {
    backend: Backend,
    cache: Mutex<QueryCache>,
}

impl EntrySync {
    pub fn new(backend: Backend) -> Self {
        Self::with_ttl(backend, CACHE_TTL)
    }

    /// A zero `ttl` turns caching off.
    pub fn with_ttl(backend: Backend, ttl: Duration) -> Self {
        Self {
            backend,
            cache: Mutex::new(QueryCache::new(ttl)),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Most recently modified first, optionally limited to one calendar year.
    pub async fn list_entries(&self, user: &AuthUser, year: Option<i32>) -> AppResult<Vec<Entry>> {
        let key = (user.id, year);
        let generation = {
            let mut cache = self.cache.lock().await;
            let ttl = cache.ttl;
            if let Some(hit) = fresh(&mut cache.lists, &key, ttl) {
                debug!(user = %user.id, ?year, "entry list served from cache");
                return Ok(hit);
            }
            cache.generation(user.id)
        };

        let range = match year {
            Some(year) => Some(
                DateRange::year(year)
                    .ok_or_else(|| AppError::bad_request(format!("year {year} is out of range")))?,
            ),
            None => None,
        };
        let entries = self.backend.list_entries(&user.access_token, range).await?;
        self.cache.lock().await.store_list(key, generation, entries.clone());
        Ok(entries)
    }

    pub async fn get_entry(&self, user: &AuthUser, id: &str) -> AppResult<Option<Entry>> {
        let Some(id) = parse_entry_id(id) else {
            return Ok(None);
        };

        let key = (user.id, id);
        let generation = {
            let mut cache = self.cache.lock().await;
            let ttl = cache.ttl;
            if let Some(hit) = fresh(&mut cache.entries, &key, ttl) {
                debug!(user = %user.id, entry = %id, "entry served from cache");
                return Ok(Some(hit));
            }
            cache.generation(user.id)
        };

        let entry = self.backend.get_entry(&user.access_token, id).await?;
        if let Some(found) = &entry {
            self.cache.lock().await.store_entry(key, generation, found.clone());
        }
        Ok(entry)
    }

    /// Insert-or-replace on `(user_id, date)`.
    pub async fn upsert_entry(&self, user: Option<&AuthUser>, draft: EntryDraft) -> AppResult<Entry> {
        let user = user.ok_or(AppError::NotAuthenticated)?;
        if draft.content.trim().is_empty() {
            return Err(AppError::bad_request("Content is required"));
        }

        let row = EntryRow {
            user_id: user.id,
            date: draft.date.unwrap_or_else(calendar::today),
            content: draft.content,
            mood_score: draft.mood_score,
            hashtags: hashtags::normalize_all(&draft.hashtags),
            photo_refs: merge_photo_refs(&[], &draft.photo_refs),
            updated_at: Utc::now(),
        };
        let entry = self.backend.upsert_entry(&user.access_token, &row).await?;
        info!(user = %user.id, entry = %entry.id, date = %row.date, "entry saved");

        let mut cache = self.cache.lock().await;
        cache.invalidate_user(user.id);
        cache.entries.insert((user.id, entry.id), cached(entry.clone()));
        Ok(entry)
    }

    pub async fn update_entry(&self, user: &AuthUser, id: Uuid, mut patch: EntryPatch) -> AppResult<Entry> {
        if patch
            .content
            .as_deref()
            .is_some_and(|content| content.trim().is_empty())
        {
            return Err(AppError::bad_request("Content is required"));
        }
        if let Some(tags) = patch.hashtags.take() {
            patch.hashtags = Some(hashtags::normalize_all(&tags));
        }

        let updated = self
            .backend
            .update_entry(&user.access_token, id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entry {id}")))?;
        info!(user = %user.id, entry = %id, "entry updated");

        let mut cache = self.cache.lock().await;
        cache.invalidate_user(user.id);
        cache.entries.remove(&(user.id, id));
        Ok(updated)
    }

    pub async fn delete_entry(&self, user: &AuthUser, id: Uuid) -> AppResult<()> {
        self.backend.delete_entry(&user.access_token, id).await?;
        info!(user = %user.id, entry = %id, "entry deleted");

        let mut cache = self.cache.lock().await;
        cache.invalidate_user(user.id);
        cache.entries.remove(&(user.id, id));
        Ok(())
    }

    pub async fn attach_photos(&self, user: &AuthUser, id: Uuid, photo_refs: &[String]) -> AppResult<Entry> {
        let entry = self
            .get_entry(user, &id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entry {id}")))?;
        let patch = EntryPatch {
            photo_refs: Some(merge_photo_refs(&entry.photo_refs, photo_refs)),
            ..EntryPatch::default()
        };
        self.update_entry(user, id, patch).await
    }

    pub async fn get_profile(&self, user: &AuthUser) -> AppResult<Option<Profile>> {
        {
            let mut cache = self.cache.lock().await;
            let ttl = cache.ttl;
            if let Some(hit) = fresh(&mut cache.profiles, &user.id, ttl) {
                return Ok(hit);
            }
        }
        let profile = self.backend.get_profile(&user.access_token, user.id).await?;
        self.cache.lock().await.profiles.insert(user.id, cached(profile.clone()));
        Ok(profile)
    }

    pub async fn update_background(&self, user: &AuthUser, color: &str) -> AppResult<Profile> {
        let patch = ProfilePatch {
            background_color: Some(color.trim().to_uppercase()),
            ..ProfilePatch::default()
        };
        self.update_profile(user, patch).await
    }

    pub async fn update_profile(&self, user: &AuthUser, patch: ProfilePatch) -> AppResult<Profile> {
        if let Some(color) = patch.background_color.as_deref() {
            if !theme::is_palette_color(color) {
                return Err(AppError::bad_request(format!(
                    "{color} is not one of the background swatches"
                )));
            }
        }

        let profile = self
            .backend
            .update_profile(&user.access_token, user.id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound("profile".into()))?;
        info!(user = %user.id, "profile updated");

        self.cache
            .lock()
            .await
            .profiles
            .insert(user.id, cached(Some(profile.clone())));
        Ok(profile)
    }
}

pub fn parse_entry_id(id: &str) -> Option<Uuid> {
    let id = id.trim();
    if id.is_empty() || id == NEW_ENTRY_ID {
        return None;
    }
    Uuid::parse_str(id).ok()
}

/// `existing` followed by the new refs it does not already contain.
pub fn merge_photo_refs(existing: &[String], new: &[String]) -> Vec<String> {
    let mut merged = Vec::with_capacity(existing.len() + new.len());
    for photo in existing.iter().chain(new) {
        let photo = photo.trim();
        if !photo.is_empty() && !merged.iter().any(|known: &String| known == photo) {
            merged.push(photo.to_string());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use chrono::NaiveDate;

    const TOKEN: &str = "token";

    async fn setup() -> (EntrySync, AuthUser) {
        setup_with_ttl(CACHE_TTL).await
    }

    async fn setup_with_ttl(ttl: Duration) -> (EntrySync, AuthUser) {
        let memory = MemoryBackend::new();
        let id = memory.register_user(TOKEN, None).await;
        let user = AuthUser {
            id,
            email: None,
            access_token: TOKEN.into(),
            provider_token: None,
        };
        (EntrySync::with_ttl(Backend::Memory(memory), ttl), user)
    }

    fn requests(sync: &EntrySync) -> usize {
        match sync.backend() {
            Backend::Memory(memory) => memory.request_count(),
            Backend::Rest(_) => unreachable!("tests run against memory"),
        }
    }

    fn draft(date: &str, content: &str) -> EntryDraft {
        EntryDraft {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
            content: content.into(),
            mood_score: 3,
            hashtags: vec!["x".into()],
            photo_refs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn upserting_the_same_date_twice_keeps_one_entry() {
        let (sync, user) = setup().await;

        sync.upsert_entry(Some(&user), draft("2024-03-01", "hi")).await.unwrap();
        sync.upsert_entry(Some(&user), draft("2024-03-01", "hello again"))
            .await
            .unwrap();

        let entries = sync.list_entries(&user, None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "hello again");
        assert_eq!(entries[0].hashtags, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn identical_upserts_are_idempotent() {
        let (sync, user) = setup().await;
        let first = sync.upsert_entry(Some(&user), draft("2024-03-01", "same")).await.unwrap();
        let second = sync.upsert_entry(Some(&user), draft("2024-03-01", "same")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(sync.list_entries(&user, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_requires_a_user() {
        let (sync, _) = setup().await;
        let err = sync.upsert_entry(None, draft("2024-03-01", "hi")).await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated));
    }

    #[tokio::test]
    async fn blank_content_is_rejected_before_the_backend() {
        let (sync, user) = setup().await;
        let before = requests(&sync);
        let err = sync
            .upsert_entry(Some(&user), draft("2024-03-01", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(requests(&sync), before);
    }

    #[tokio::test]
    async fn new_sentinel_resolves_without_a_request() {
        let (sync, user) = setup().await;
        let before = requests(&sync);

        assert!(sync.get_entry(&user, NEW_ENTRY_ID).await.unwrap().is_none());
        assert!(sync.get_entry(&user, "").await.unwrap().is_none());
        assert!(sync.get_entry(&user, "not-a-uuid").await.unwrap().is_none());
        assert_eq!(requests(&sync), before);
    }

    #[tokio::test]
    async fn year_filter_uses_the_calendar_date() {
        let (sync, user) = setup().await;
        sync.upsert_entry(Some(&user), draft("2024-01-01", "new year"))
            .await
            .unwrap();
        sync.upsert_entry(Some(&user), draft("2023-12-31", "eve")).await.unwrap();

        let entries = sync.list_entries(&user, Some(2023)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "eve");
    }

    #[tokio::test]
    async fn lists_are_cached_until_a_mutation() {
        let (sync, user) = setup().await;
        sync.list_entries(&user, None).await.unwrap();
        let after_first = requests(&sync);
        sync.list_entries(&user, None).await.unwrap();
        assert_eq!(requests(&sync), after_first);

        let entry = sync.upsert_entry(Some(&user), draft("2024-03-01", "hi")).await.unwrap();
        assert_eq!(sync.list_entries(&user, None).await.unwrap().len(), 1);

        sync.delete_entry(&user, entry.id).await.unwrap();
        assert!(sync.list_entries(&user, None).await.unwrap().is_empty());
        assert!(sync.get_entry(&user, &entry.id.to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_refreshes_the_single_entry_cache() {
        let (sync, user) = setup().await;
        let entry = sync.upsert_entry(Some(&user), draft("2024-03-01", "hi")).await.unwrap();
        let id = entry.id.to_string();
        assert_eq!(sync.get_entry(&user, &id).await.unwrap().unwrap().content, "hi");

        let patch = EntryPatch {
            content: Some("edited".into()),
            hashtags: Some(vec!["#a".into(), "a".into()]),
            ..EntryPatch::default()
        };
        sync.update_entry(&user, entry.id, patch).await.unwrap();

        let fetched = sync.get_entry(&user, &id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "edited");
        assert_eq!(fetched.hashtags, vec!["a".to_string()]);
        assert_eq!(sync.list_entries(&user, None).await.unwrap()[0].content, "edited");
    }

    #[tokio::test]
    async fn updating_a_missing_entry_is_not_found() {
        let (sync, user) = setup().await;
        let err = sync
            .update_entry(&user, Uuid::new_v4(), EntryPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn attached_photos_are_merged_without_duplicates() {
        let (sync, user) = setup().await;
        let mut first = draft("2024-03-01", "hi");
        first.photo_refs = vec!["a".into()];
        let entry = sync.upsert_entry(Some(&user), first).await.unwrap();

        let updated = sync
            .attach_photos(&user, entry.id, &["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(updated.photo_refs, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn background_must_come_from_the_palette() {
        let (sync, user) = setup().await;
        let err = sync
            .update_profile(
                &user,
                ProfilePatch {
                    background_color: Some("#123456".into()),
                    ..ProfilePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let profile = sync
            .update_profile(
                &user,
                ProfilePatch {
                    background_color: Some("#F3E8FF".into()),
                    ..ProfilePatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.background_color.as_deref(), Some("#F3E8FF"));
        assert_eq!(sync.get_profile(&user).await.unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn background_swatches_are_stored_canonically() {
        let (sync, user) = setup().await;
        let profile = sync.update_background(&user, " #ecfdf5 ").await.unwrap();
        assert_eq!(profile.background_color.as_deref(), Some("#ECFDF5"));
        assert!(matches!(
            sync.update_background(&user, "teal").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn missing_entries_are_not_remembered() {
        let (sync, user) = setup().await;
        let id = Uuid::new_v4().to_string();

        let before = requests(&sync);
        assert!(sync.get_entry(&user, &id).await.unwrap().is_none());
        assert!(sync.get_entry(&user, &id).await.unwrap().is_none());
        assert_eq!(requests(&sync), before + 2);
        assert!(sync.cache.lock().await.entries.is_empty());
    }

    #[tokio::test]
    async fn changes_from_other_clients_show_up_after_the_ttl() {
        let (sync, user) = setup_with_ttl(Duration::from_millis(20)).await;
        assert!(sync.list_entries(&user, None).await.unwrap().is_empty());

        let row = EntryRow {
            user_id: user.id,
            date: calendar::today(),
            content: "from the phone".into(),
            mood_score: 4,
            hashtags: Vec::new(),
            photo_refs: Vec::new(),
            updated_at: Utc::now(),
        };
        sync.backend().upsert_entry(TOKEN, &row).await.unwrap();
        assert!(sync.list_entries(&user, None).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(40)).await;
        let entries = sync.list_entries(&user, None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "from the phone");
    }

    #[tokio::test]
    async fn zero_ttl_always_reads_through() {
        let (sync, user) = setup_with_ttl(Duration::ZERO).await;
        sync.list_entries(&user, None).await.unwrap();
        let after_first = requests(&sync);
        sync.list_entries(&user, None).await.unwrap();
        assert_eq!(requests(&sync), after_first + 1);
    }

    #[test]
    fn reads_overtaken_by_a_mutation_are_not_cached() {
        let mut cache = QueryCache::new(CACHE_TTL);
        let user = Uuid::new_v4();
        let seen = cache.generation(user);

        cache.invalidate_user(user);
        cache.store_list((user, None), seen, Vec::new());
        assert!(cache.lists.is_empty());

        cache.store_list((user, None), cache.generation(user), Vec::new());
        assert_eq!(cache.lists.len(), 1);
    }
}
