use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/entry", get(handlers::new_entry_page).post(handlers::submit_entry))
        .route(
            "/entry/:id",
            get(handlers::edit_entry_page).post(handlers::submit_entry_update),
        )
        .route("/entry/:id/delete", post(handlers::delete_entry_form))
        .route("/entries", get(handlers::entries_page))
        .route("/trends", get(handlers::trends_page))
        .route("/settings", get(handlers::settings_page))
        .route("/settings/background", post(handlers::update_background))
        .route("/export.json", get(handlers::export_json))
        .route(
            "/api/entries",
            get(handlers::list_entries).post(handlers::create_entry),
        )
        .route(
            "/api/entries/:id",
            get(handlers::get_entry)
                .patch(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
        .route("/api/entries/:id/photos", post(handlers::attach_photos))
        .route("/api/calendar", get(handlers::get_calendar))
        .route("/api/trends", get(handlers::get_trends))
        .route(
            "/api/profile",
            get(handlers::get_profile).patch(handlers::update_profile),
        )
        .route("/api/photos/sessions", post(handlers::start_picker))
        .route(
            "/api/photos/sessions/:id",
            get(handlers::picker_state).delete(handlers::stop_picker),
        )
        .route("/api/flags", get(handlers::list_flags))
        .route("/api/flags/:name", post(handlers::set_flag))
        .route("/health", get(handlers::health))
        .with_state(state)
}
