use crate::calendar::MonthGrid;
use crate::models::{Entry, Profile};
use crate::mood::{self, Mood};
use crate::theme::{PALETTE, Theme};
use crate::trends::TrendsResponse;
use std::fmt::Write;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Ok,
    Error,
}

/// Transient banner shown on top of a page.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    /// Maps the `notice` query value set by redirects after a form post.
    pub fn from_code(code: &str) -> Option<Self> {
        let message = match code {
            "saved" => "Entry saved. Your journal is up to date.",
            "updated" => "Entry updated.",
            "deleted" => "Entry deleted from your journal.",
            "background" => "Background color updated.",
            _ => return None,
        };
        Some(Self::ok(message))
    }
}

pub struct EntryForm {
    pub id: Option<Uuid>,
    pub date: String,
    pub content: String,
    pub mood_score: i32,
    pub hashtags: Vec<String>,
    pub photo_refs: Vec<String>,
}

impl EntryForm {
    pub fn blank(date: String) -> Self {
        Self {
            id: None,
            date,
            content: String::new(),
            mood_score: 3,
            hashtags: Vec::new(),
            photo_refs: Vec::new(),
        }
    }

    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            id: Some(entry.id),
            date: entry.date_key().unwrap_or_default(),
            content: entry.content.clone(),
            mood_score: if Mood::from_score(entry.mood_score).is_some() {
                entry.mood_score
            } else {
                3
            },
            hashtags: entry.hashtags.clone(),
            photo_refs: entry.photo_refs.clone(),
        }
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, theme: &Theme, notice: Option<&Notice>, body: &str) -> String {
    let notice_html = notice
        .map(|notice| {
            let class = match notice.kind {
                NoticeKind::Ok => "toast ok",
                NoticeKind::Error => "toast error",
            };
            format!(
                r#"<div class="{class}" role="status">{}</div>"#,
                escape_html(&notice.message)
            )
        })
        .unwrap_or_default();

    LAYOUT_HTML
        .replace("{{TITLE}}", &escape_html(title))
        .replace("{{BACKGROUND}}", theme.background_color)
        .replace("{{NOTICE}}", &notice_html)
        .replace("{{BODY}}", body)
}

pub struct IndexView<'a> {
    pub grid: &'a MonthGrid,
    pub recent: &'a [Entry],
    pub show_seasonal_animation: bool,
}

pub fn render_index(view: &IndexView<'_>, theme: &Theme, notice: Option<&Notice>) -> String {
    let grid = view.grid;
    let mut body = String::new();

    body.push_str(r#"<h1>Your pixel grid</h1><p class="subtitle">Every square is a day. Click one to read or write.</p>"#);
    if view.show_seasonal_animation {
        body.push_str(r#"<div class="hearts-rain" aria-hidden="true">💜 💗 💜 💗 💜</div>"#);
    }

    body.push_str(r#"<section class="card"><div class="month-nav">"#);
    let _ = write!(
        body,
        r#"<a class="btn" href="/?month={}">&larr;</a><strong>{}</strong>"#,
        grid.previous,
        escape_html(&grid.label)
    );
    match &grid.next {
        Some(next) => {
            let _ = write!(body, r#"<a class="btn" href="/?month={next}">&rarr;</a>"#);
        }
        None => body.push_str(r#"<span class="btn disabled">&rarr;</span>"#),
    }
    body.push_str("</div>");

    body.push_str(r#"<div class="grid weekdays">"#);
    for day in ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"] {
        let _ = write!(body, "<div>{day}</div>");
    }
    body.push_str("</div>");

    let shape = if grid.hearts { "pixel heart" } else { "pixel" };
    body.push_str(r#"<div class="grid">"#);
    for _ in 0..grid.leading_blanks {
        body.push_str(r#"<div class="blank"></div>"#);
    }
    for cell in &grid.cells {
        let today = if cell.is_today { " today" } else { "" };
        let empty = if cell.entry_id.is_none() { " empty" } else { "" };
        let _ = write!(
            body,
            r#"<a class="{shape}{today}{empty}" href="{}" style="background-color:{}" title="{}"><span>{}</span></a>"#,
            escape_html(&cell.href),
            cell.color,
            cell.date,
            cell.glyph.map_or_else(|| cell.day.to_string(), str::to_string),
        );
    }
    body.push_str("</div>");

    body.push_str(r#"<div class="legend">"#);
    for mood in Mood::all() {
        let _ = write!(
            body,
            r#"<span><i style="background-color:{}"></i>{} {}</span>"#,
            mood.color(),
            mood.score(),
            mood.label()
        );
    }
    body.push_str("</div></section>");

    if !view.recent.is_empty() {
        body.push_str(r#"<h2>Recent entries</h2><div class="cards">"#);
        for entry in view.recent {
            body.push_str(&entry_card(entry));
        }
        body.push_str("</div>");
    }

    layout("Pixels", theme, notice, &body)
}

fn entry_card(entry: &Entry) -> String {
    let date = entry
        .date
        .map(|date| date.format("%A %-d %B %Y").to_string())
        .unwrap_or_else(|| "Unknown date".into());
    let tags: String = entry
        .hashtags
        .iter()
        .map(|tag| format!(r#"<span class="tag">#{}</span>"#, escape_html(tag)))
        .collect();
    format!(
        r#"<a class="entry-card" href="/entry/{}" style="border-left-color:{}"><div class="entry-head"><span>{}</span><span class="glyph">{}</span></div><p>{}</p><div>{}</div></a>"#,
        entry.id,
        mood::color_for(entry.mood_score),
        escape_html(&date),
        mood::glyph_for(entry.mood_score),
        escape_html(&entry.content),
        tags
    )
}

pub fn render_entry_form(form: &EntryForm, theme: &Theme, notice: Option<&Notice>) -> String {
    let (title, action) = match form.id {
        Some(id) => ("Edit entry".to_string(), format!("/entry/{id}")),
        None => ("New pixel".to_string(), "/entry".to_string()),
    };

    let mut moods = String::new();
    for mood in Mood::all() {
        let checked = if mood.score() == form.mood_score { " checked" } else { "" };
        let _ = write!(
            moods,
            r#"<label class="mood" style="background-color:{}"><input type="radio" name="mood_score" value="{}"{checked}><span class="glyph">{}</span><span>{}</span></label>"#,
            mood.color(),
            mood.score(),
            mood.glyph(),
            mood.label()
        );
    }

    let photos: String = form
        .photo_refs
        .iter()
        .map(|photo| {
            let photo = escape_html(photo);
            format!(r#"<img class="photo" src="{photo}" alt="">"#)
        })
        .collect();

    let mut body = String::new();
    let _ = write!(
        body,
        r#"<h1>{title}</h1>
<form method="post" action="{action}" class="card form">
  <label>Date <input type="date" name="date" value="{date}" required></label>
  <fieldset class="moods"><legend>How do you feel?</legend>{moods}</fieldset>
  <label>Your story <textarea name="content" rows="6" required>{content}</textarea></label>
  <label>Hashtags <input type="text" name="hashtags" value="{hashtags}" placeholder="Add hashtags, space separated"></label>
  <input type="hidden" name="photo_refs" value="{photo_refs}">
  <div class="photos">{photos}</div>
  <button class="btn primary" type="submit">Save</button>
</form>"#,
        date = escape_html(&form.date),
        content = escape_html(&form.content),
        hashtags = escape_html(
            &form
                .hashtags
                .iter()
                .map(|tag| format!("#{tag}"))
                .collect::<Vec<_>>()
                .join(" ")
        ),
        photo_refs = escape_html(&form.photo_refs.join("\n")),
    );

    if let Some(id) = form.id {
        let _ = write!(
            body,
            r#"<form method="post" action="/entry/{id}/delete" class="danger"><button class="btn" type="submit">Delete entry</button></form>"#
        );
    }

    layout(&title, theme, notice, &body)
}

pub fn render_entries(entries: &[Entry], theme: &Theme, notice: Option<&Notice>) -> String {
    let mut body = String::from("<h1>All entries</h1>");
    if entries.is_empty() {
        body.push_str(r#"<p class="subtitle">No entries yet. Start writing!</p>"#);
    }
    body.push_str(r#"<div class="cards">"#);
    for entry in entries {
        let _ = write!(
            body,
            r#"<div class="managed">{}<form method="post" action="/entry/{}/delete"><button class="btn" type="submit">Delete</button></form></div>"#,
            entry_card(entry),
            entry.id
        );
    }
    body.push_str("</div>");
    layout("Entries", theme, notice, &body)
}

pub fn render_trends(trends: &TrendsResponse, theme: &Theme, notice: Option<&Notice>) -> String {
    let mut body = String::from(
        r#"<h1>Trends</h1><p class="subtitle">Your mood over time.</p><div class="stats">"#,
    );
    let _ = write!(
        body,
        r#"<div class="stat"><span class="label">Total entries</span><span class="value">{}</span></div>
<div class="stat"><span class="label">Overall average</span><span class="value">{:.1}</span></div>
<div class="stat" style="background-color:{}"><span class="label">Dominant mood</span><span class="value">{}/5</span></div></div>"#,
        trends.total_entries, trends.overall_average, trends.dominant_color, trends.dominant_mood
    );

    body.push_str(r#"<section class="card"><h2>Mood by weekday</h2>"#);
    if trends.total_entries == 0 {
        body.push_str(r#"<p class="subtitle">No data yet. Start writing!</p>"#);
    } else {
        body.push_str(r#"<div class="bars">"#);
        for point in &trends.by_weekday {
            let height = (point.average / f64::from(mood::MAX_SCORE) * 100.0).clamp(0.0, 100.0);
            let _ = write!(
                body,
                r#"<div class="bar" title="{:.1} average over {} entries"><i style="height:{height:.0}%;background-color:{}"></i><span>{}</span></div>"#,
                point.average, point.count, point.color, point.day
            );
        }
        body.push_str("</div>");
    }
    body.push_str("</section>");

    body.push_str(r#"<section class="card"><h2>Weekly averages</h2><table>"#);
    for week in &trends.weekly_averages {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{} → {}</td><td>{} days</td><td>{:.1}</td></tr>",
            week.week, week.start_date, week.end_date, week.days_logged, week.average
        );
    }
    body.push_str("</table></section>");

    layout("Trends", theme, notice, &body)
}

pub fn render_settings(
    profile: Option<&Profile>,
    entry_count: usize,
    theme: &Theme,
    notice: Option<&Notice>,
) -> String {
    let mut swatches = String::new();
    for swatch in PALETTE {
        let selected = if theme.background_color == swatch.value && profile.is_some() {
            " selected"
        } else {
            ""
        };
        let _ = write!(
            swatches,
            r#"<button class="swatch{selected}" type="submit" name="background_color" value="{value}" title="{name}" style="background-color:{value}"></button>"#,
            value = swatch.value,
            name = swatch.name
        );
    }

    let mut body = String::from("<h1>Settings</h1>");
    let _ = write!(
        body,
        r#"<section class="card"><h2>Background color</h2><form method="post" action="/settings/background" class="swatches">{swatches}</form></section>
<section class="card"><h2>Export data</h2><p>Download all your entries as JSON so you never lose them.</p><a class="btn" href="/export.json">Export ({entry_count} entries)</a></section>"#
    );
    layout("Settings", theme, notice, &body)
}

pub fn render_message(title: &str, theme: &Theme, notice: &Notice) -> String {
    let body = format!(
        r#"<h1>{}</h1><p class="subtitle"><a href="/">Back to the grid</a></p>"#,
        escape_html(title)
    );
    layout(title, theme, Some(notice), &body)
}

const LAYOUT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{TITLE}} · Mood Pixels</title>
  <style>
    :root {
      --ink: #111111;
      --card: rgba(255, 255, 255, 0.85);
      --shadow: 4px 4px 0 #111111;
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
    }

    nav {
      display: flex;
      gap: 18px;
      padding: 16px 24px;
      border-bottom: 2px solid var(--ink);
      background: var(--card);
    }

    nav a {
      color: var(--ink);
      font-weight: 700;
      text-decoration: none;
      text-transform: uppercase;
    }

    main {
      width: min(960px, 100%);
      margin: 0 auto;
      padding: 32px 18px 48px;
    }

    h1 {
      margin: 0 0 6px;
    }

    .subtitle {
      margin: 0 0 24px;
      color: #5f5c57;
    }

    .card {
      background: var(--card);
      border: 2px solid var(--ink);
      box-shadow: var(--shadow);
      padding: 24px;
      margin-bottom: 24px;
    }

    .btn {
      display: inline-block;
      border: 2px solid var(--ink);
      background: white;
      color: var(--ink);
      padding: 8px 14px;
      font-weight: 700;
      text-decoration: none;
      cursor: pointer;
    }

    .btn.primary {
      background: var(--ink);
      color: white;
    }

    .btn.disabled {
      opacity: 0.3;
      cursor: default;
    }

    .month-nav {
      display: flex;
      align-items: center;
      justify-content: space-between;
      margin-bottom: 18px;
    }

    .grid {
      display: grid;
      grid-template-columns: repeat(7, 1fr);
      gap: 8px;
    }

    .weekdays div {
      text-align: center;
      font-size: 12px;
      font-weight: 900;
      text-transform: uppercase;
    }

    .pixel {
      aspect-ratio: 1;
      display: flex;
      align-items: center;
      justify-content: center;
      border: 2px solid var(--ink);
      color: var(--ink);
      font-size: 11px;
      font-weight: 900;
      text-decoration: none;
      transition: transform 120ms ease;
    }

    .pixel:hover {
      transform: scale(1.1);
    }

    .pixel.today {
      outline: 4px solid #f97316;
      outline-offset: -4px;
    }

    .pixel.heart {
      border: none;
      clip-path: path("M20 35 L5 20 A8 8 0 0 1 20 8 A8 8 0 0 1 35 20 Z");
    }

    .pixel.heart.empty {
      background-color: #e5e7eb !important;
    }

    .pixel.heart span {
      display: none;
    }

    .legend {
      display: flex;
      flex-wrap: wrap;
      gap: 16px;
      margin-top: 18px;
      font-size: 12px;
    }

    .legend i {
      display: inline-block;
      width: 14px;
      height: 14px;
      border: 1px solid var(--ink);
      margin-right: 6px;
      vertical-align: middle;
    }

    .cards {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(260px, 1fr));
      gap: 16px;
    }

    .entry-card {
      display: block;
      background: var(--card);
      border: 1px solid #d4d4d4;
      border-left: 6px solid #d4d4d4;
      padding: 16px;
      color: var(--ink);
      text-decoration: none;
    }

    .entry-head {
      display: flex;
      justify-content: space-between;
      font-size: 13px;
      color: #5f5c57;
    }

    .tag {
      display: inline-block;
      margin: 2px 4px 0 0;
      padding: 2px 6px;
      background: #e9d5ff;
      font-size: 12px;
    }

    .form label {
      display: block;
      margin-bottom: 16px;
      font-weight: 600;
    }

    .form input[type="text"],
    .form input[type="date"],
    .form textarea {
      display: block;
      width: 100%;
      margin-top: 6px;
      padding: 10px;
      border: 2px solid var(--ink);
      font: inherit;
    }

    .moods {
      display: flex;
      flex-wrap: wrap;
      gap: 8px;
      border: none;
      padding: 0;
      margin: 0 0 16px;
    }

    .mood {
      display: flex !important;
      flex-direction: column;
      align-items: center;
      min-width: 80px;
      padding: 10px;
      border: 2px solid var(--ink);
      cursor: pointer;
    }

    .mood .glyph {
      font-size: 24px;
    }

    .photo {
      width: 120px;
      height: 120px;
      object-fit: cover;
      border: 2px solid var(--ink);
      margin-right: 8px;
    }

    .danger {
      margin-top: 12px;
    }

    .stats {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
      gap: 16px;
      margin-bottom: 24px;
    }

    .stat {
      background: var(--card);
      border: 2px solid var(--ink);
      box-shadow: var(--shadow);
      padding: 18px;
    }

    .stat span {
      display: block;
    }

    .stat .label {
      font-size: 0.85rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: #5f5c57;
    }

    .stat .value {
      font-size: 2.2rem;
      font-weight: 700;
    }

    .bars {
      display: grid;
      grid-template-columns: repeat(7, 1fr);
      gap: 10px;
      height: 220px;
      align-items: end;
    }

    .bar {
      height: 100%;
      display: flex;
      flex-direction: column;
      justify-content: flex-end;
      text-align: center;
      font-size: 12px;
    }

    .bar i {
      display: block;
      border: 1px solid var(--ink);
    }

    table {
      width: 100%;
      border-collapse: collapse;
      font-size: 14px;
    }

    td {
      padding: 6px 4px;
      border-bottom: 1px solid #e5e5e5;
    }

    .swatches {
      display: flex;
      gap: 12px;
      flex-wrap: wrap;
    }

    .swatch {
      width: 64px;
      height: 64px;
      border-radius: 50%;
      border: 2px solid var(--ink);
      cursor: pointer;
    }

    .swatch.selected {
      outline: 4px solid var(--ink);
      outline-offset: 2px;
    }

    .toast {
      position: fixed;
      right: 18px;
      bottom: 18px;
      padding: 14px 18px;
      border: 2px solid var(--ink);
      box-shadow: var(--shadow);
      background: white;
      font-weight: 600;
      animation: fade 4s forwards;
    }

    .toast.error {
      background: #fecaca;
    }

    .hearts-rain {
      font-size: 28px;
      text-align: center;
      animation: fade 3s forwards;
    }

    @keyframes fade {
      0%, 80% {
        opacity: 1;
      }
      100% {
        opacity: 0;
        visibility: hidden;
      }
    }
  </style>
</head>
<body style="background-color: {{BACKGROUND}}">
  <nav>
    <a href="/">Grid</a>
    <a href="/entry">New</a>
    <a href="/entries">Entries</a>
    <a href="/trends">Trends</a>
    <a href="/settings">Settings</a>
  </nav>
  <main>
{{BODY}}
  </main>
  {{NOTICE}}
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{MonthCursor, build_month_grid};
    use chrono::NaiveDate;

    fn entry(content: &str, mood_score: i32) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1),
            content: content.into(),
            mood_score,
            hashtags: vec!["tag<".into()],
            photo_refs: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn user_text_is_escaped() {
        assert_eq!(escape_html(r#"<b a="1">&'"#), "&lt;b a=&quot;1&quot;&gt;&amp;&#39;");

        let entries = vec![entry("<script>alert(1)</script>", 5)];
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let grid = build_month_grid(MonthCursor::containing(today), &entries, today);
        let html = render_index(
            &IndexView {
                grid: &grid,
                recent: &entries,
                show_seasonal_animation: false,
            },
            &Theme::default(),
            None,
        );
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("#tag&lt;"));
    }

    #[test]
    fn index_uses_the_derived_background() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let grid = build_month_grid(MonthCursor::containing(today), &[], today);
        let theme = Theme {
            background_color: "#ECFDF5",
        };
        let html = render_index(
            &IndexView {
                grid: &grid,
                recent: &[],
                show_seasonal_animation: false,
            },
            &theme,
            Some(&Notice::ok("Entry saved.")),
        );
        assert!(html.contains("background-color: #ECFDF5"));
        assert!(html.contains("Entry saved."));
        assert!(html.contains(r#"<span class="btn disabled">"#));
    }

    #[test]
    fn edit_form_posts_to_the_entry_and_offers_delete() {
        let existing = entry("hello", 4);
        let html = render_entry_form(&EntryForm::from_entry(&existing), &Theme::default(), None);
        assert!(html.contains(&format!(r#"action="/entry/{}""#, existing.id)));
        assert!(html.contains(&format!("/entry/{}/delete", existing.id)));
        assert!(html.contains(r#"value="4" checked"#));
        assert!(html.contains(r#"value="2024-03-01""#));
    }

    #[test]
    fn unknown_moods_default_the_form_selector() {
        let existing = entry("hello", 9);
        assert_eq!(EntryForm::from_entry(&existing).mood_score, 3);
    }

    #[test]
    fn notice_codes() {
        assert!(Notice::from_code("saved").is_some());
        assert!(Notice::from_code("<bogus>").is_none());
    }
}
