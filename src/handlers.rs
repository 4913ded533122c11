use crate::calendar::{self, MonthCursor, MonthGrid, build_month_grid};
use crate::errors::{AppError, AppResult};
use crate::export::{export_entries, export_file_name};
use crate::hashtags::parse_hashtags;
use crate::models::{Entry, EntryDraft, EntryPatch, Profile, ProfilePatch, date_key, parse_date_key};
use crate::picker::{PickerCommand, PickerState, spawn_picker};
use crate::session::{AuthUser, MaybeUser};
use crate::state::AppState;
use crate::storage::{flag_key, persist_flags};
use crate::sync::parse_entry_id;
use crate::theme::Theme;
use crate::trends::{TrendsResponse, build_trends};
use crate::ui::{self, EntryForm, IndexView, Notice};
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

const RECENT_ENTRY_COUNT: usize = 3;
const SEASONAL_ANIMATION_FLAG: &str = "valentine-hearts";

/// Renders an [`AppError`] as an HTML page with the message in a banner.
pub struct PageError {
    error: AppError,
    theme: Theme,
}

impl From<AppError> for PageError {
    fn from(error: AppError) -> Self {
        Self {
            error,
            theme: Theme::default(),
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status.is_server_error() {
            tracing::error!(error = %self.error, "page failed");
        }
        let title = match self.error {
            AppError::NotAuthenticated => "Please sign in",
            AppError::NotFound(_) => "Nothing here",
            _ => "Something went wrong",
        };
        let html = ui::render_message(title, &self.theme, &Notice::error(self.error.to_string()));
        (status, Html(html)).into_response()
    }
}

type PageResult<T> = Result<T, PageError>;

trait Themed<T> {
    fn themed(self, theme: &Theme) -> PageResult<T>;
}

impl<T> Themed<T> for AppResult<T> {
    fn themed(self, theme: &Theme) -> PageResult<T> {
        self.map_err(|error| PageError {
            error,
            theme: theme.clone(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    notice: Option<String>,
}

impl NoticeQuery {
    fn notice(&self) -> Option<Notice> {
        self.notice.as_deref().and_then(Notice::from_code)
    }
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    month: Option<String>,
    notice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewEntryQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    month: Option<String>,
}

/// Entry form fields as posted by the browser.
#[derive(Debug, Default, Deserialize)]
pub struct EntryFormInput {
    #[serde(default)]
    date: String,
    #[serde(default)]
    content: String,
    mood_score: Option<i32>,
    #[serde(default)]
    hashtags: String,
    #[serde(default)]
    photo_refs: String,
}

impl EntryFormInput {
    fn to_draft(&self) -> AppResult<EntryDraft> {
        let mood_score = self
            .mood_score
            .ok_or_else(|| AppError::bad_request("Pick a mood for the day"))?;
        let date = match self.date.trim() {
            "" => None,
            raw => Some(
                parse_date_key(raw)
                    .ok_or_else(|| AppError::bad_request(format!("{raw} is not a date")))?,
            ),
        };
        Ok(EntryDraft {
            date,
            content: self.content.clone(),
            mood_score,
            hashtags: parse_hashtags(&self.hashtags),
            photo_refs: self.photo_list(),
        })
    }

    fn photo_list(&self) -> Vec<String> {
        self.photo_refs
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Keeps what the user typed when a submission is rejected.
    fn to_form(&self, id: Option<Uuid>) -> EntryForm {
        EntryForm {
            id,
            date: self.date.clone(),
            content: self.content.clone(),
            mood_score: self.mood_score.unwrap_or(3),
            hashtags: parse_hashtags(&self.hashtags),
            photo_refs: self.photo_list(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BackgroundForm {
    background_color: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachPhotosRequest {
    session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StopPickerQuery {
    #[serde(default)]
    dismissed: bool,
}

#[derive(Debug, Serialize)]
pub struct PickerSessionResponse {
    id: Uuid,
    #[serde(flatten)]
    state: PickerState,
}

#[derive(Debug, Serialize)]
pub struct FlagResponse {
    name: String,
    newly_set: bool,
}

async fn theme_for(state: &AppState, user: &AuthUser) -> AppResult<Theme> {
    let profile = state.sync.get_profile(user).await?;
    Ok(Theme::from_profile(profile.as_ref()))
}

/// The user's theme for an error response; the default when it cannot be loaded.
async fn fallback_theme(state: &AppState, user: Option<&AuthUser>) -> Theme {
    let Some(user) = user else {
        return Theme::default();
    };
    match theme_for(state, user).await {
        Ok(theme) => theme,
        Err(err) => {
            warn!(error = %err, "could not load theme for error page");
            Theme::default()
        }
    }
}

/// Marks a per-user flag and persists the store; true when newly set.
async fn mark_flag(state: &AppState, user: &AuthUser, name: &str) -> AppResult<bool> {
    let key = flag_key(&user.id.to_string(), name);
    let mut flags = state.flags.lock().await;
    if !flags.mark(&key) {
        return Ok(false);
    }
    persist_flags(&state.flags_path, &flags).await?;
    info!(user = %user.id, flag = name, "flag set");
    Ok(true)
}

async fn month_grid(state: &AppState, user: &AuthUser, month: Option<&str>) -> AppResult<MonthGrid> {
    let today = calendar::today();
    let cursor = MonthCursor::resolve(month, today);
    let entries = state.sync.list_entries(user, Some(cursor.year())).await?;
    Ok(build_month_grid(cursor, &entries, today))
}

pub async fn index(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<IndexQuery>,
) -> PageResult<Html<String>> {
    let user = user.required()?;
    let theme = theme_for(&state, &user).await?;
    let grid = month_grid(&state, &user, query.month.as_deref())
        .await
        .themed(&theme)?;
    let entries = state.sync.list_entries(&user, None).await.themed(&theme)?;
    let recent: Vec<Entry> = entries.into_iter().take(RECENT_ENTRY_COUNT).collect();
    let show_seasonal_animation = grid.hearts
        && mark_flag(&state, &user, SEASONAL_ANIMATION_FLAG)
            .await
            .themed(&theme)?;
    let notice = query.notice.as_deref().and_then(Notice::from_code);

    Ok(Html(ui::render_index(
        &IndexView {
            grid: &grid,
            recent: &recent,
            show_seasonal_animation,
        },
        &theme,
        notice.as_ref(),
    )))
}

pub async fn new_entry_page(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<NewEntryQuery>,
) -> PageResult<Html<String>> {
    let user = user.required()?;
    let date = query
        .date
        .as_deref()
        .and_then(parse_date_key)
        .unwrap_or_else(calendar::today);
    let theme = theme_for(&state, &user).await?;
    let form = EntryForm::blank(date_key(date));
    Ok(Html(ui::render_entry_form(&form, &theme, None)))
}

pub async fn edit_entry_page(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
    Query(query): Query<NoticeQuery>,
) -> PageResult<Html<String>> {
    let user = user.required()?;
    let theme = theme_for(&state, &user).await?;
    let form = match state.sync.get_entry(&user, &id).await.themed(&theme)? {
        Some(entry) => EntryForm::from_entry(&entry),
        None if parse_entry_id(&id).is_none() => {
            EntryForm::blank(date_key(calendar::today()))
        }
        None => return Err(AppError::NotFound(format!("entry {id}"))).themed(&theme),
    };
    Ok(Html(ui::render_entry_form(&form, &theme, query.notice().as_ref())))
}

fn rejected_form(input: &EntryFormInput, id: Option<Uuid>, theme: &Theme, err: AppError) -> Response {
    warn!(error = %err, "entry form rejected");
    let status = err.status();
    let html = ui::render_entry_form(&input.to_form(id), theme, Some(&Notice::error(err.to_string())));
    (status, Html(html)).into_response()
}

pub async fn submit_entry(
    State(state): State<AppState>,
    user: MaybeUser,
    Form(input): Form<EntryFormInput>,
) -> Response {
    let saved = match input.to_draft() {
        Ok(draft) => state.sync.upsert_entry(user.0.as_ref(), draft).await,
        Err(err) => Err(err),
    };
    match saved {
        Ok(_) => Redirect::to("/?notice=saved").into_response(),
        Err(err) => {
            let theme = fallback_theme(&state, user.0.as_ref()).await;
            rejected_form(&input, None, &theme, err)
        }
    }
}

async fn apply_entry_form(
    state: &AppState,
    user: Option<&AuthUser>,
    id: Option<Uuid>,
    input: &EntryFormInput,
) -> AppResult<Entry> {
    let user = user.ok_or(AppError::NotAuthenticated)?;
    let id = id.ok_or_else(|| AppError::NotFound("entry".into()))?;
    let draft = input.to_draft()?;
    let patch = EntryPatch {
        date: draft.date,
        content: Some(draft.content),
        mood_score: Some(draft.mood_score),
        hashtags: Some(draft.hashtags),
        photo_refs: Some(draft.photo_refs),
    };
    state.sync.update_entry(user, id, patch).await
}

pub async fn submit_entry_update(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
    Form(input): Form<EntryFormInput>,
) -> Response {
    let entry_id = parse_entry_id(&id);
    match apply_entry_form(&state, user.0.as_ref(), entry_id, &input).await {
        Ok(entry) => Redirect::to(&format!("/entry/{}?notice=updated", entry.id)).into_response(),
        Err(err) => {
            let theme = fallback_theme(&state, user.0.as_ref()).await;
            rejected_form(&input, entry_id, &theme, err)
        }
    }
}

pub async fn delete_entry_form(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> PageResult<Redirect> {
    let user = user.required()?;
    let deleted = match parse_entry_id(&id) {
        Some(id) => state.sync.delete_entry(&user, id).await,
        None => Err(AppError::NotFound(format!("entry {id}"))),
    };
    if let Err(err) = deleted {
        let theme = fallback_theme(&state, Some(&user)).await;
        return Err(err).themed(&theme);
    }
    Ok(Redirect::to("/entries?notice=deleted"))
}

pub async fn entries_page(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<NoticeQuery>,
) -> PageResult<Html<String>> {
    let user = user.required()?;
    let theme = theme_for(&state, &user).await?;
    let entries = state.sync.list_entries(&user, None).await.themed(&theme)?;
    Ok(Html(ui::render_entries(&entries, &theme, query.notice().as_ref())))
}

pub async fn trends_page(State(state): State<AppState>, user: MaybeUser) -> PageResult<Html<String>> {
    let user = user.required()?;
    let theme = theme_for(&state, &user).await?;
    let entries = state.sync.list_entries(&user, None).await.themed(&theme)?;
    Ok(Html(ui::render_trends(&build_trends(&entries), &theme, None)))
}

pub async fn settings_page(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<NoticeQuery>,
) -> PageResult<Html<String>> {
    let user = user.required()?;
    let profile = state.sync.get_profile(&user).await?;
    let theme = Theme::from_profile(profile.as_ref());
    let entries = state.sync.list_entries(&user, None).await.themed(&theme)?;
    Ok(Html(ui::render_settings(
        profile.as_ref(),
        entries.len(),
        &theme,
        query.notice().as_ref(),
    )))
}

pub async fn update_background(
    State(state): State<AppState>,
    user: MaybeUser,
    Form(form): Form<BackgroundForm>,
) -> PageResult<Redirect> {
    let user = user.required()?;
    if let Err(err) = state.sync.update_background(&user, &form.background_color).await {
        let theme = fallback_theme(&state, Some(&user)).await;
        return Err(err).themed(&theme);
    }
    Ok(Redirect::to("/settings?notice=background"))
}

pub async fn export_json(State(state): State<AppState>, user: MaybeUser) -> PageResult<Response> {
    let user = user.required()?;
    let entries = state.sync.list_entries(&user, None).await?;
    let body = export_entries(&entries).map_err(AppError::from)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(calendar::today())
    );
    info!(user = %user.id, entries = entries.len(), "entries exported");
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub async fn list_entries(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<YearQuery>,
) -> AppResult<Json<Vec<Entry>>> {
    let user = user.required()?;
    Ok(Json(state.sync.list_entries(&user, query.year).await?))
}

pub async fn create_entry(
    State(state): State<AppState>,
    user: MaybeUser,
    Json(draft): Json<EntryDraft>,
) -> AppResult<Json<Entry>> {
    let entry = state.sync.upsert_entry(user.0.as_ref(), draft).await?;
    Ok(Json(entry))
}

pub async fn get_entry(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Option<Entry>>> {
    let user = user.required()?;
    Ok(Json(state.sync.get_entry(&user, &id).await?))
}

pub async fn update_entry(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
    Json(patch): Json<EntryPatch>,
) -> AppResult<Json<Entry>> {
    let user = user.required()?;
    let id = parse_entry_id(&id).ok_or_else(|| AppError::NotFound(format!("entry {id}")))?;
    Ok(Json(state.sync.update_entry(&user, id, patch).await?))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let user = user.required()?;
    let id = parse_entry_id(&id).ok_or_else(|| AppError::NotFound(format!("entry {id}")))?;
    state.sync.delete_entry(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn attach_photos(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
    Json(request): Json<AttachPhotosRequest>,
) -> AppResult<Json<Entry>> {
    let user = user.required()?;
    let id = parse_entry_id(&id).ok_or_else(|| AppError::NotFound(format!("entry {id}")))?;
    let photos = state.pickers.take_photos(user.id, request.session_id).await?;
    Ok(Json(state.sync.attach_photos(&user, id, &photos).await?))
}

pub async fn get_calendar(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<MonthGrid>> {
    let user = user.required()?;
    Ok(Json(month_grid(&state, &user, query.month.as_deref()).await?))
}

pub async fn get_trends(State(state): State<AppState>, user: MaybeUser) -> AppResult<Json<TrendsResponse>> {
    let user = user.required()?;
    let entries = state.sync.list_entries(&user, None).await?;
    Ok(Json(build_trends(&entries)))
}

pub async fn get_profile(State(state): State<AppState>, user: MaybeUser) -> AppResult<Json<Option<Profile>>> {
    let user = user.required()?;
    Ok(Json(state.sync.get_profile(&user).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: MaybeUser,
    Json(patch): Json<ProfilePatch>,
) -> AppResult<Json<Profile>> {
    let user = user.required()?;
    Ok(Json(state.sync.update_profile(&user, patch).await?))
}

pub async fn start_picker(
    State(state): State<AppState>,
    user: MaybeUser,
) -> AppResult<(StatusCode, Json<PickerSessionResponse>)> {
    let user = user.required()?;
    let token = user.provider_token()?.to_string();

    let mut handle = spawn_picker(state.photos.clone(), token, state.picker_poll_interval);
    let started = handle.started().await;
    if let PickerState::Failed { reason } = started {
        return Err(AppError::ExternalService(reason));
    }
    let id = state.pickers.insert(user.id, handle).await;
    info!(user = %user.id, picker = %id, "photo picker started");
    Ok((
        StatusCode::CREATED,
        Json(PickerSessionResponse { id, state: started }),
    ))
}

pub async fn picker_state(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PickerSessionResponse>> {
    let user = user.required()?;
    let picker = state
        .pickers
        .state(user.id, id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("picker session {id}")))?;
    Ok(Json(PickerSessionResponse { id, state: picker }))
}

pub async fn stop_picker(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
    Query(query): Query<StopPickerQuery>,
) -> AppResult<Json<PickerSessionResponse>> {
    let user = user.required()?;
    let command = if query.dismissed {
        PickerCommand::Dismiss
    } else {
        PickerCommand::Cancel
    };
    let picker = state
        .pickers
        .stop(user.id, id, command)
        .await
        .ok_or_else(|| AppError::NotFound(format!("picker session {id}")))?;
    Ok(Json(PickerSessionResponse { id, state: picker }))
}

pub async fn list_flags(
    State(state): State<AppState>,
    user: MaybeUser,
) -> AppResult<Json<BTreeMap<String, bool>>> {
    let user = user.required()?;
    let prefix = flag_key(&user.id.to_string(), "");
    let flags = state.flags.lock().await;
    let mine = flags
        .flags
        .iter()
        .filter_map(|(key, set)| key.strip_prefix(&prefix).map(|name| (name.to_string(), *set)))
        .collect();
    Ok(Json(mine))
}

pub async fn set_flag(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(name): Path<String>,
) -> AppResult<Json<FlagResponse>> {
    let user = user.required()?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("flag name is required"));
    }
    let newly_set = mark_flag(&state, &user, &name).await?;
    Ok(Json(FlagResponse { name, newly_set }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn input(date: &str, mood_score: Option<i32>) -> EntryFormInput {
        EntryFormInput {
            date: date.into(),
            content: "Walked the dog".into(),
            mood_score,
            hashtags: "#walk, dog  #walk".into(),
            photo_refs: "https://a/1=w1080\n\n https://a/2=w1080 ".into(),
        }
    }

    #[test]
    fn form_input_becomes_a_draft() {
        let draft = input("2024-03-01", Some(4)).to_draft().unwrap();
        assert_eq!(draft.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(draft.mood_score, 4);
        assert_eq!(draft.hashtags, vec!["walk", "dog"]);
        assert_eq!(draft.photo_refs, vec!["https://a/1=w1080", "https://a/2=w1080"]);
    }

    #[test]
    fn blank_date_means_today() {
        let draft = input("  ", Some(2)).to_draft().unwrap();
        assert_eq!(draft.date, None);
    }

    #[test]
    fn form_input_is_validated() {
        assert!(matches!(
            input("2024-03-01", None).to_draft(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            input("yesterday", Some(3)).to_draft(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejected_form_keeps_typed_values() {
        let form = input("2024-03-01", None).to_form(None);
        assert_eq!(form.content, "Walked the dog");
        assert_eq!(form.mood_score, 3);
        assert_eq!(form.date, "2024-03-01");
    }

    #[test]
    fn page_errors_render_html_with_status() {
        let response = PageError::from(AppError::NotAuthenticated).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
    }

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn error_pages_keep_the_user_background() {
        let theme = Theme {
            background_color: "#ECFDF5",
        };
        let response = match Err::<(), _>(AppError::NotFound("entry".into())).themed(&theme) {
            Err(page) => page.into_response(),
            Ok(()) => unreachable!(),
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("#ECFDF5"));
    }

    #[tokio::test]
    async fn rejected_forms_keep_the_user_background() {
        let theme = Theme {
            background_color: "#ECFDF5",
        };
        let response = rejected_form(
            &input("2024-03-01", None),
            None,
            &theme,
            AppError::bad_request("Pick a mood for the day"),
        );
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let html = body_text(response).await;
        assert!(html.contains("#ECFDF5"));
        assert!(html.contains("Pick a mood for the day"));
    }
}
