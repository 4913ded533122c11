use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_API_URL: &str = "https://photospicker.googleapis.com/v1";
const PHOTO_SIZE_SUFFIX: &str = "=w1080";
const MAX_SESSION_AGE: Duration = Duration::from_secs(30 * 60);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PickerState {
    Idle,
    SessionCreated {
        session_id: String,
        picker_uri: String,
    },
    Polling {
        session_id: String,
        picker_uri: String,
        polls: u32,
    },
    Fetching {
        session_id: String,
    },
    Done {
        photo_refs: Vec<String>,
    },
    Cancelled,
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerEvent {
    SessionCreated { session_id: String, picker_uri: String },
    SessionFailed(String),
    Polled { media_items_set: bool },
    /// Transient; polling continues.
    PollFailed(String),
    PollRejected(String),
    Expired,
    Dismissed { media_items_set: bool },
    ItemsFetched(Vec<String>),
    FetchFailed(String),
    Cancel,
}

impl PickerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PickerState::Done { .. } | PickerState::Cancelled | PickerState::Failed { .. }
        )
    }

    pub fn apply(self, event: PickerEvent) -> PickerState {
        use PickerEvent as E;
        use PickerState as S;

        match (self, event) {
            (state, _) if state.is_terminal() => state,
            (_, E::Cancel) => S::Cancelled,

            (S::Idle, E::SessionCreated { session_id, picker_uri }) => {
                S::SessionCreated { session_id, picker_uri }
            }
            (S::Idle, E::SessionFailed(reason)) => S::Failed { reason },

            (
                S::SessionCreated { session_id, picker_uri },
                E::Polled { media_items_set: false } | E::PollFailed(_),
            ) => S::Polling {
                session_id,
                picker_uri,
                polls: 1,
            },
            (
                S::Polling {
                    session_id,
                    picker_uri,
                    polls,
                },
                E::Polled { media_items_set: false } | E::PollFailed(_),
            ) => S::Polling {
                session_id,
                picker_uri,
                polls: polls.saturating_add(1),
            },
            (
                S::SessionCreated { session_id, .. } | S::Polling { session_id, .. },
                E::Polled { media_items_set: true } | E::Dismissed { media_items_set: true },
            ) => S::Fetching { session_id },
            (
                S::SessionCreated { .. } | S::Polling { .. },
                E::Dismissed { media_items_set: false },
            ) => S::Cancelled,
            (S::SessionCreated { .. } | S::Polling { .. }, E::PollRejected(reason)) => {
                S::Failed { reason }
            }
            (S::SessionCreated { .. } | S::Polling { .. }, E::Expired) => S::Failed {
                reason: "picker session expired".into(),
            },

            (S::Fetching { .. }, E::ItemsFetched(photo_refs)) => S::Done { photo_refs },
            (S::Fetching { .. }, E::FetchFailed(reason)) => S::Failed { reason },

            (state, _) => state,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerSession {
    pub id: String,
    pub picker_uri: String,
    #[serde(default)]
    pub media_items_set: bool,
    #[serde(default)]
    pub expire_time: Option<DateTime<Utc>>,
}

impl PickerSession {
    /// The picker closes its own window once the selection is done.
    pub fn autoclose_uri(&self) -> String {
        format!("{}/autoclose", self.picker_uri.trim_end_matches('/'))
    }

    pub fn lifetime(&self, now: DateTime<Utc>) -> Duration {
        match self.expire_time {
            Some(expires) => (expires - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SESSION_AGE),
            None => MAX_SESSION_AGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PickerError {
    /// Network trouble, throttling or a server error. Worth another poll.
    #[error("picker unavailable: {0}")]
    Unavailable(String),

    #[error("picker rejected the request: {0}")]
    Rejected(String),
}

pub type PickerResult<T> = Result<T, PickerError>;

pub trait PickerApi: Send + Sync + 'static {
    fn create_session(&self, token: &str) -> impl Future<Output = PickerResult<PickerSession>> + Send;

    fn media_items_set(
        &self,
        token: &str,
        session_id: &str,
    ) -> impl Future<Output = PickerResult<bool>> + Send;

    fn list_photo_refs(
        &self,
        token: &str,
        session_id: &str,
    ) -> impl Future<Output = PickerResult<Vec<String>>> + Send;

    fn delete_session(&self, token: &str, session_id: &str) -> impl Future<Output = PickerResult<()>> + Send;
}

pub struct PhotosClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItemsPage {
    #[serde(default)]
    media_items: Vec<PickedMediaItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PickedMediaItem {
    id: String,
    media_file: Option<MediaFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaFile {
    base_url: String,
}

impl PhotosClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl PickerApi for PhotosClient {
    async fn create_session(&self, token: &str) -> PickerResult<PickerSession> {
        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(external)?;
        checked(response)
            .await?
            .json()
            .await
            .map_err(external)
    }

    async fn media_items_set(&self, token: &str, session_id: &str) -> PickerResult<bool> {
        let response = self
            .client
            .get(format!("{}/sessions/{session_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(external)?;
        let session: PickerSession = checked(response).await?.json().await.map_err(external)?;
        Ok(session.media_items_set)
    }

    async fn list_photo_refs(&self, token: &str, session_id: &str) -> PickerResult<Vec<String>> {
        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("sessionId", session_id.to_string())];
            if let Some(page_token) = &page_token {
                query.push(("pageToken", page_token.clone()));
            }
            let response = self
                .client
                .get(format!("{}/mediaItems", self.base_url))
                .bearer_auth(token)
                .query(&query)
                .send()
                .await
                .map_err(external)?;
            let page: MediaItemsPage = checked(response).await?.json().await.map_err(external)?;

            for item in page.media_items {
                match item.media_file {
                    Some(file) => refs.push(format!("{}{PHOTO_SIZE_SUFFIX}", file.base_url)),
                    None => warn!(item = %item.id, "picked item has no media file"),
                }
            }

            match page.next_page_token.filter(|next| !next.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(refs),
            }
        }
    }

    async fn delete_session(&self, token: &str, session_id: &str) -> PickerResult<()> {
        let response = self
            .client
            .delete(format!("{}/sessions/{session_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(external)?;
        checked(response).await.map(|_| ())
    }
}

fn external(err: reqwest::Error) -> PickerError {
    if err.is_decode() {
        PickerError::Rejected(err.to_string())
    } else {
        PickerError::Unavailable(err.to_string())
    }
}

async fn checked(response: Response) -> PickerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(rejection(status, &body))
}

fn rejection(status: StatusCode, body: &str) -> PickerError {
    let message = format!("picker responded with {status}: {body}");
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        PickerError::Unavailable(message)
    } else {
        PickerError::Rejected(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerCommand {
    Cancel,
    Dismiss,
}

#[derive(Clone)]
pub struct PickerHandle {
    state: watch::Receiver<PickerState>,
    commands: mpsc::Sender<PickerCommand>,
}

impl PickerHandle {
    pub fn state(&self) -> PickerState {
        self.state.borrow().clone()
    }

    /// Waits until the session exists or creation failed.
    pub async fn started(&mut self) -> PickerState {
        let seen = self
            .state
            .wait_for(|state| !matches!(state, PickerState::Idle))
            .await
            .map(|state| state.clone());
        seen.unwrap_or_else(|_| self.state())
    }

    pub async fn finished(&mut self) -> PickerState {
        let seen = self
            .state
            .wait_for(PickerState::is_terminal)
            .await
            .map(|state| state.clone());
        seen.unwrap_or_else(|_| self.state())
    }

    pub async fn send(&self, command: PickerCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }
}

pub fn spawn_picker<A: PickerApi>(api: Arc<A>, token: String, poll_interval: Duration) -> PickerHandle {
    let (state_tx, state_rx) = watch::channel(PickerState::Idle);
    let (command_tx, command_rx) = mpsc::channel(4);
    tokio::spawn(drive(api, token, poll_interval, state_tx, command_rx));
    PickerHandle {
        state: state_rx,
        commands: command_tx,
    }
}

async fn drive<A: PickerApi>(
    api: Arc<A>,
    token: String,
    poll_interval: Duration,
    publish: watch::Sender<PickerState>,
    mut commands: mpsc::Receiver<PickerCommand>,
) {
    let (event, lifetime) = match api.create_session(&token).await {
        Ok(session) => {
            let lifetime = session.lifetime(Utc::now());
            let event = PickerEvent::SessionCreated {
                picker_uri: session.autoclose_uri(),
                session_id: session.id,
            };
            (event, lifetime)
        }
        Err(err) => (PickerEvent::SessionFailed(err.to_string()), Duration::ZERO),
    };
    let mut current = advance(&publish, PickerState::Idle, event);

    let expiry = tokio::time::sleep_until(Instant::now() + lifetime);
    tokio::pin!(expiry);
    let mut ticker = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    while !current.is_terminal() {
        let event = match &current {
            PickerState::Fetching { session_id } => {
                match api.list_photo_refs(&token, session_id).await {
                    Ok(refs) => PickerEvent::ItemsFetched(refs),
                    Err(err) => PickerEvent::FetchFailed(err.to_string()),
                }
            }
            PickerState::SessionCreated { session_id, .. } | PickerState::Polling { session_id, .. } => {
                tokio::select! {
                    _ = ticker.tick() => match api.media_items_set(&token, session_id).await {
                        Ok(media_items_set) => PickerEvent::Polled { media_items_set },
                        Err(err @ PickerError::Unavailable(_)) => PickerEvent::PollFailed(err.to_string()),
                        Err(err) => PickerEvent::PollRejected(err.to_string()),
                    },
                    _ = &mut expiry => {
                        discard(api.as_ref(), &token, session_id).await;
                        PickerEvent::Expired
                    }
                    command = commands.recv() => match command {
                        Some(PickerCommand::Dismiss) => {
                            let media_items_set = api.media_items_set(&token, session_id).await.unwrap_or(false);
                            if !media_items_set {
                                discard(api.as_ref(), &token, session_id).await;
                            }
                            PickerEvent::Dismissed { media_items_set }
                        }
                        Some(PickerCommand::Cancel) | None => {
                            discard(api.as_ref(), &token, session_id).await;
                            PickerEvent::Cancel
                        }
                    },
                }
            }
            PickerState::Idle | PickerState::Done { .. } | PickerState::Cancelled | PickerState::Failed { .. } => break,
        };
        current = advance(&publish, current, event);
    }

    match &current {
        PickerState::Done { photo_refs } => info!(photos = photo_refs.len(), "photo selection finished"),
        PickerState::Failed { reason } => warn!(%reason, "photo picker failed"),
        _ => debug!(state = ?current, "photo picker stopped"),
    }
}

async fn discard<A: PickerApi>(api: &A, token: &str, session_id: &str) {
    if let Err(err) = api.delete_session(token, session_id).await {
        warn!(error = %err, "could not delete picker session");
    }
}

fn advance(publish: &watch::Sender<PickerState>, current: PickerState, event: PickerEvent) -> PickerState {
    if let PickerEvent::PollFailed(reason) = &event {
        warn!(%reason, "picker poll failed, will retry");
    }
    let next = current.apply(event);
    publish.send_replace(next.clone());
    next
}

struct PickerSlot {
    owner: Uuid,
    handle: PickerHandle,
}

/// One live picker per user; starting another cancels the previous one.
#[derive(Clone, Default)]
pub struct PickerRegistry {
    slots: Arc<Mutex<HashMap<Uuid, PickerSlot>>>,
}

impl PickerRegistry {
    pub async fn insert(&self, owner: Uuid, handle: PickerHandle) -> Uuid {
        let mut slots = self.slots.lock().await;
        let previous: Vec<Uuid> = slots
            .iter()
            .filter(|(_, slot)| slot.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        for id in previous {
            if let Some(slot) = slots.remove(&id) {
                slot.handle.send(PickerCommand::Cancel).await;
            }
        }

        let id = Uuid::new_v4();
        slots.insert(id, PickerSlot { owner, handle });
        id
    }

    pub async fn state(&self, owner: Uuid, id: Uuid) -> Option<PickerState> {
        let slots = self.slots.lock().await;
        slots
            .get(&id)
            .filter(|slot| slot.owner == owner)
            .map(|slot| slot.handle.state())
    }

    pub async fn stop(&self, owner: Uuid, id: Uuid, command: PickerCommand) -> Option<PickerState> {
        let mut handle = {
            let slots = self.slots.lock().await;
            slots
                .get(&id)
                .filter(|slot| slot.owner == owner)
                .map(|slot| slot.handle.clone())?
        };
        handle.send(command).await;
        let state = handle.finished().await;
        if !matches!(state, PickerState::Done { .. }) {
            self.slots.lock().await.remove(&id);
        }
        Some(state)
    }

    pub async fn take_photos(&self, owner: Uuid, id: Uuid) -> AppResult<Vec<String>> {
        let mut slots = self.slots.lock().await;
        let state = slots
            .get(&id)
            .filter(|slot| slot.owner == owner)
            .map(|slot| slot.handle.state())
            .ok_or_else(|| AppError::NotFound(format!("picker session {id}")))?;
        match state {
            PickerState::Done { photo_refs } => {
                slots.remove(&id);
                Ok(photo_refs)
            }
            other => Err(AppError::bad_request(format!(
                "picker session is not finished ({other:?})"
            ))),
        }
    }
}
