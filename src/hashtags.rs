/// Trims a raw token and drops one leading '#'.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let tag = trimmed.strip_prefix('#').unwrap_or(trimmed).trim();
    (!tag.is_empty()).then(|| tag.to_string())
}

/// Appends `raw` when it normalizes to a tag not already present.
pub fn push_tag(tags: &mut Vec<String>, raw: &str) -> bool {
    match normalize_tag(raw) {
        Some(tag) if !tags.contains(&tag) => {
            tags.push(tag);
            true
        }
        _ => false,
    }
}

/// Splits free text on whitespace and commas, keeping first occurrences.
pub fn parse_hashtags(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for token in text.split(|c: char| c.is_whitespace() || c == ',') {
        push_tag(&mut tags, token);
    }
    tags
}

pub fn normalize_all<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = Vec::new();
    for token in raw {
        push_tag(&mut tags, token.as_ref());
    }
    tags
}
