//! Display configuration sent to the client.
//!
//! A host [`Profile`] may omit any field. [`DisplayConfig::resolve`] fills
//! every gap with a fixed default so the client always receives a complete
//! `config` message.

use serde::Serialize;

use crate::host::{Color, Profile, Scrollback};

/// Font used when the profile has none.
pub const DEFAULT_FONT: &str = "Monaco 12";
/// Cursor type used when the profile has none.
pub const DEFAULT_CURSOR_TYPE: &str = "CURSOR_TYPE_BLOCK";
/// Scrollback reported for unlimited or unknown history.
pub const DEFAULT_SCROLLBACK: u32 = 100_000;
/// Color used for any missing color field.
pub const DEFAULT_COLOR: &str = "#ffffff";
/// Number of ANSI palette entries.
pub const ANSI_COLOR_COUNT: usize = 16;

/// Payload of the `config` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfig {
    /// Font description.
    pub font: String,
    /// Cursor type name.
    pub cursor_type: String,
    /// Whether the cursor blinks.
    pub cursor_blink: bool,
    /// Scrollback lines.
    pub scrollback: u32,
    /// Foreground color, `#rrggbb`.
    pub foreground: String,
    /// Background color, `#rrggbb`.
    pub background: String,
    /// Cursor color, `#rrggbb`.
    pub cursor: String,
    /// Selection color, `#rrggbb`.
    pub selection_color: String,
    /// ANSI palette, always 16 entries.
    pub ansi_colors: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self::resolve(&Profile::default())
    }
}

impl DisplayConfig {
    /// Resolve a profile, substituting defaults for missing fields.
    pub fn resolve(profile: &Profile) -> Self {
        let scrollback = match profile.scrollback {
            Some(Scrollback::Lines(n)) => n,
            Some(Scrollback::Unlimited) | None => DEFAULT_SCROLLBACK,
        };
        let ansi_colors = (0..ANSI_COLOR_COUNT)
            .map(|i| color_to_hex(profile.ansi.get(i).copied().flatten()))
            .collect();

        Self {
            font: profile.font.clone().unwrap_or_else(|| DEFAULT_FONT.to_string()),
            cursor_type: profile
                .cursor_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CURSOR_TYPE.to_string()),
            cursor_blink: profile.cursor_blink.unwrap_or(false),
            scrollback,
            foreground: color_to_hex(profile.foreground),
            background: color_to_hex(profile.background),
            cursor: color_to_hex(profile.cursor),
            selection_color: color_to_hex(profile.selection),
            ansi_colors,
        }
    }
}

/// Format a unit-range color as `#rrggbb`.
///
/// Each channel is `trunc(c * 255)` clamped to `0..=255`; `None` gives
/// [`DEFAULT_COLOR`].
pub fn color_to_hex(color: Option<Color>) -> String {
    let Some(c) = color else {
        return DEFAULT_COLOR.to_string();
    };
    format!(
        "#{:02x}{:02x}{:02x}",
        channel(c.red),
        channel(c.green),
        channel(c.blue)
    )
}

fn channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value * 255.0).trunc().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_profile_resolves_to_defaults() {
        let cfg = DisplayConfig::resolve(&Profile::default());
        assert_eq!(cfg.font, "Monaco 12");
        assert_eq!(cfg.cursor_type, "CURSOR_TYPE_BLOCK");
        assert!(!cfg.cursor_blink);
        assert_eq!(cfg.scrollback, 100_000);
        assert_eq!(cfg.foreground, "#ffffff");
        assert_eq!(cfg.selection_color, "#ffffff");
        assert_eq!(cfg.ansi_colors, vec!["#ffffff".to_string(); 16]);
    }

    #[test]
    fn test_channel_truncates_and_clamps() {
        assert_eq!(color_to_hex(Some(Color::new(0.0, 0.5, 1.0))), "#007fff");
        assert_eq!(color_to_hex(Some(Color::new(-0.2, 1.7, f64::NAN))), "#00ff00");
        assert_eq!(color_to_hex(Some(Color::new(0.999, 0.004, 0.1))), "#fe0119");
    }

    #[test]
    fn test_partial_profile_keeps_given_fields() {
        let mut ansi = vec![None; 3];
        ansi[1] = Some(Color::new(1.0, 0.0, 0.0));
        let profile = Profile {
            font: Some("Menlo 14".into()),
            cursor_blink: Some(true),
            scrollback: Some(Scrollback::Lines(5000)),
            background: Some(Color::new(0.0, 0.0, 0.0)),
            ansi,
            ..Profile::default()
        };
        let cfg = DisplayConfig::resolve(&profile);
        assert_eq!(cfg.font, "Menlo 14");
        assert!(cfg.cursor_blink);
        assert_eq!(cfg.scrollback, 5000);
        assert_eq!(cfg.background, "#000000");
        assert_eq!(cfg.foreground, "#ffffff");
        assert_eq!(cfg.ansi_colors.len(), 16);
        assert_eq!(cfg.ansi_colors[0], "#ffffff");
        assert_eq!(cfg.ansi_colors[1], "#ff0000");
    }

    #[test]
    fn test_unlimited_scrollback_reports_default() {
        let profile = Profile {
            scrollback: Some(Scrollback::Unlimited),
            ..Profile::default()
        };
        assert_eq!(DisplayConfig::resolve(&profile).scrollback, 100_000);
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(DisplayConfig::default()).unwrap();
        assert_eq!(value["cursorType"], "CURSOR_TYPE_BLOCK");
        assert_eq!(value["selectionColor"], "#ffffff");
        assert_eq!(value["ansiColors"].as_array().unwrap().len(), 16);
    }
}
