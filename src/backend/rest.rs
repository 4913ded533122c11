use super::{DateRange, EntryRow, UserIdentity};
use crate::errors::{AppError, AppResult};
use crate::models::{Entry, EntryPatch, Profile, ProfilePatch};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;
use uuid::Uuid;

const RETURN_REPRESENTATION: &str = "return=representation";
const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=representation";

/// PostgREST tables under `/rest/v1` and the auth user endpoint under
/// `/auth/v1`, authorized with the project key plus the user's token.
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct Stamped<'a, T> {
    #[serde(flatten)]
    body: &'a T,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
}

impl RestBackend {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    pub async fn current_user(&self, token: &str) -> AppResult<Option<UserIdentity>> {
        let response = send(self.request(Method::GET, "/auth/v1/user", token)).await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }
        Ok(Some(read_json(response).await?))
    }

    pub async fn list_entries(&self, token: &str, range: Option<DateRange>) -> AppResult<Vec<Entry>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "updated_at.desc".to_string()),
        ];
        if let Some(range) = range {
            query.push(("date", format!("gte.{}", range.start)));
            query.push(("date", format!("lte.{}", range.end)));
        }
        debug!(?range, "listing entries");
        let builder = self
            .request(Method::GET, "/rest/v1/entries", token)
            .query(&query);
        read_json(send(builder).await?).await
    }

    pub async fn get_entry(&self, token: &str, id: Uuid) -> AppResult<Option<Entry>> {
        let builder = self
            .request(Method::GET, "/rest/v1/entries", token)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        let rows: Vec<Entry> = read_json(send(builder).await?).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn upsert_entry(&self, token: &str, row: &EntryRow) -> AppResult<Entry> {
        let builder = self
            .request(Method::POST, "/rest/v1/entries", token)
            .query(&[("on_conflict", "user_id,date")])
            .header("Prefer", UPSERT_PREFERENCE)
            .json(&[row]);
        let rows: Vec<Entry> = read_json(send(builder).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::BackendQuery("upsert returned no row".into()))
    }

    pub async fn update_entry(
        &self,
        token: &str,
        id: Uuid,
        patch: &EntryPatch,
    ) -> AppResult<Option<Entry>> {
        let body = Stamped {
            body: patch,
            updated_at: Utc::now(),
        };
        let builder = self
            .request(Method::PATCH, "/rest/v1/entries", token)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&body);
        let rows: Vec<Entry> = read_json(send(builder).await?).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn delete_entry(&self, token: &str, id: Uuid) -> AppResult<()> {
        let builder = self
            .request(Method::DELETE, "/rest/v1/entries", token)
            .query(&[("id", format!("eq.{id}"))]);
        ensure_success(send(builder).await?).await
    }

    pub async fn get_profile(&self, token: &str, user_id: Uuid) -> AppResult<Option<Profile>> {
        let builder = self
            .request(Method::GET, "/rest/v1/profiles", token)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{user_id}"))]);
        let rows: Vec<Profile> = read_json(send(builder).await?).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn update_profile(
        &self,
        token: &str,
        user_id: Uuid,
        patch: &ProfilePatch,
    ) -> AppResult<Option<Profile>> {
        let builder = self
            .request(Method::PATCH, "/rest/v1/profiles", token)
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(patch);
        let rows: Vec<Profile> = read_json(send(builder).await?).await?;
        Ok(rows.into_iter().next())
    }
}

async fn send(builder: RequestBuilder) -> AppResult<Response> {
    builder
        .send()
        .await
        .map_err(|err| AppError::BackendQuery(err.to_string()))
}

async fn ensure_success(response: Response) -> AppResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::BackendQuery(error_message(status, &body)))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::BackendQuery(error_message(status, &body)));
    }
    response
        .json()
        .await
        .map_err(|err| AppError::BackendQuery(err.to_string()))
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|err| err.message.or(err.msg))
        .unwrap_or_else(|| format!("backend responded with {status}"))
}
