//! Mood score presentation: colors, glyphs and labels.

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

pub const NEUTRAL_COLOR: &str = "#FFFFFF";
pub const UNKNOWN_GLYPH: &str = "❓";

const COLORS: [&str; 5] = ["#FECACA", "#FED7AA", "#FEF08A", "#BBF7D0", "#E9D5FF"];
const GLYPHS: [&str; 5] = ["⛈️", "☔️", "😐", "😊", "😁"];
const LABELS: [&str; 5] = ["Terrible", "Bad", "Neutral", "Good", "Excellent"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mood(u8);

impl Mood {
    pub fn from_score(score: i32) -> Option<Self> {
        (MIN_SCORE..=MAX_SCORE)
            .contains(&score)
            .then(|| Self((score - MIN_SCORE) as u8))
    }

    pub fn all() -> impl Iterator<Item = Mood> {
        (MIN_SCORE..=MAX_SCORE).filter_map(Mood::from_score)
    }

    pub fn score(self) -> i32 {
        i32::from(self.0) + MIN_SCORE
    }

    pub fn color(self) -> &'static str {
        COLORS[usize::from(self.0)]
    }

    pub fn glyph(self) -> &'static str {
        GLYPHS[usize::from(self.0)]
    }

    pub fn label(self) -> &'static str {
        LABELS[usize::from(self.0)]
    }
}

pub fn glyph_for(score: i32) -> &'static str {
    Mood::from_score(score).map_or(UNKNOWN_GLYPH, Mood::glyph)
}

pub fn color_for(score: i32) -> &'static str {
    Mood::from_score(score).map_or(NEUTRAL_COLOR, Mood::color)
}

/// Palette color for a fractional average; anything below 2 maps to the
/// first swatch and anything from 5 up to the last.
pub fn color_for_average(value: f64) -> &'static str {
    let index = (value.floor() as i64 - 1).clamp(0, COLORS.len() as i64 - 1);
    COLORS[index as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_scores_render_unknown() {
        assert_eq!(glyph_for(0), UNKNOWN_GLYPH);
        assert_eq!(glyph_for(6), UNKNOWN_GLYPH);
        assert_eq!(glyph_for(-3), UNKNOWN_GLYPH);
        assert_eq!(color_for(6), NEUTRAL_COLOR);
    }

    #[test]
    fn in_range_scores_map_to_their_swatch() {
        assert_eq!(color_for(1), "#FECACA");
        assert_eq!(color_for(5), "#E9D5FF");
        assert_eq!(glyph_for(3), "😐");
        assert_eq!(Mood::from_score(4).map(Mood::label), Some("Good"));
        assert_eq!(Mood::all().count(), 5);
    }

    #[test]
    fn averages_clamp_into_the_palette() {
        assert_eq!(color_for_average(0.0), "#FECACA");
        assert_eq!(color_for_average(3.7), "#FEF08A");
        assert_eq!(color_for_average(5.0), "#E9D5FF");
    }
}
