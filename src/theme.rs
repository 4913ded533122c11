use crate::models::Profile;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Swatch {
    pub name: &'static str,
    pub value: &'static str,
}

pub const PALETTE: [Swatch; 5] = [
    Swatch { name: "White", value: "#FFFFFF" },
    Swatch { name: "Cream", value: "#FFF8E7" },
    Swatch { name: "Lavender", value: "#F3E8FF" },
    Swatch { name: "Mint", value: "#ECFDF5" },
    Swatch { name: "Peach", value: "#FFF1E6" },
];

pub const DEFAULT_BACKGROUND: &str = PALETTE[0].value;

pub fn is_palette_color(color: &str) -> bool {
    PALETTE
        .iter()
        .any(|swatch| swatch.value.eq_ignore_ascii_case(color.trim()))
}

/// Page style derived from the signed-in user's profile. Rebuilt per
/// render; a missing profile or an off-palette color yields the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub background_color: &'static str,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background_color: DEFAULT_BACKGROUND,
        }
    }
}

impl Theme {
    pub fn from_profile(profile: Option<&Profile>) -> Self {
        profile
            .and_then(|profile| profile.background_color.as_deref())
            .and_then(|color| {
                PALETTE
                    .iter()
                    .find(|swatch| swatch.value.eq_ignore_ascii_case(color.trim()))
            })
            .map(|swatch| Self {
                background_color: swatch.value,
            })
            .unwrap_or_default()
    }
}
