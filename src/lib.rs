pub mod app;
pub mod backend;
pub mod calendar;
pub mod config;
pub mod errors;
pub mod export;
pub mod handlers;
pub mod hashtags;
pub mod models;
pub mod mood;
pub mod picker;
pub mod session;
pub mod state;
pub mod storage;
pub mod sync;
pub mod theme;
pub mod trends;
pub mod ui;

pub use app::router;
pub use config::Config;
pub use state::AppState;
