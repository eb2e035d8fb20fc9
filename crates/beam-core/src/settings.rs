//! Decoder settings loaded from TOML.
//!
//! - `init_custom(toml_content)` sets a custom TOML before first `settings()` call
//! - `settings()` returns `&'static Settings` (lazy-init singleton)
//! - Default values are embedded via `include_str!("default_settings.toml")`
//!
//! Engines never read the singleton themselves: callers pass a
//! `SearchSettings` value at construction, where it is validated again.

use std::sync::OnceLock;

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

/// Accepted lookahead window sizes.
pub const LOOKAHEAD_WINDOW_RANGE: std::ops::RangeInclusive<usize> = 1..=10;

static CUSTOM_TOML: OnceLock<String> = OnceLock::new();

/// Set custom TOML before first `settings()` call.
pub fn init_custom(toml_content: String) -> Result<(), SettingsError> {
    parse_settings_toml(&toml_content)?;
    CUSTOM_TOML
        .set(toml_content)
        .map_err(|_| SettingsError::AlreadyInitialized)
}

/// Get or initialize the global settings singleton.
pub fn settings() -> &'static Settings {
    static INSTANCE: OnceLock<Settings> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let toml_str = CUSTOM_TOML
            .get()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_SETTINGS_TOML);
        parse_settings_toml(toml_str).expect("settings TOML must be valid")
    })
}

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("settings already initialized")]
    AlreadyInitialized,
}

impl SettingsError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub search: SearchSettings,
    pub active_list: ActiveListSettings,
    pub fast_match_active_list: ActiveListSettings,
}

/// Construction-time parameters of the lookahead search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchSettings {
    /// Number of fast-match snapshots consulted per main-search frame.
    pub lookahead_window: usize,
    /// Multiplier applied to the lookahead penalty before the beam test.
    pub lookahead_penalty_weight: f32,
    pub relative_word_beam_width: f32,
    /// Growth is skipped on frames divisible by this value; 0 never skips.
    pub grow_skip_interval: u32,
    pub check_state_order: bool,
    pub build_word_lattice: bool,
    pub max_lattice_edges: usize,
    pub acoustic_lookahead_frames: f32,
    /// Keep every token on predecessor paths instead of word tokens only.
    pub keep_all_tokens: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ActiveListSettings {
    /// Maximum tokens kept after commit; 0 keeps all.
    pub absolute_beam_width: usize,
    /// Log-domain offset from the best score; must not be positive.
    pub relative_beam_width: f32,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    s.search.validate()?;
    s.active_list.validate("active_list")?;
    s.fast_match_active_list
        .validate("fast_match_active_list")?;
    Ok(s)
}

/// Validates that a lookahead window size is usable.
pub fn check_lookahead_window(window: usize) -> Result<(), SettingsError> {
    if !LOOKAHEAD_WINDOW_RANGE.contains(&window) {
        return Err(SettingsError::invalid(
            "search.lookahead_window",
            format!(
                "unsupported lookahead window size {window}, value in range [1..10] is expected"
            ),
        ));
    }
    Ok(())
}

fn check_beam(field: &str, value: f32) -> Result<(), SettingsError> {
    if value.is_nan() || value > 0.0 {
        return Err(SettingsError::invalid(field, "must be zero or negative"));
    }
    Ok(())
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_lookahead_window(self.lookahead_window)?;
        if !self.lookahead_penalty_weight.is_finite() || self.lookahead_penalty_weight < 0.0 {
            return Err(SettingsError::invalid(
                "search.lookahead_penalty_weight",
                "must be finite and non-negative",
            ));
        }
        check_beam("search.relative_word_beam_width", self.relative_word_beam_width)?;
        if self.max_lattice_edges == 0 {
            return Err(SettingsError::invalid(
                "search.max_lattice_edges",
                "must be positive",
            ));
        }
        if !self.acoustic_lookahead_frames.is_finite() || self.acoustic_lookahead_frames < 0.0 {
            return Err(SettingsError::invalid(
                "search.acoustic_lookahead_frames",
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

impl ActiveListSettings {
    pub fn validate(&self, section: &str) -> Result<(), SettingsError> {
        check_beam(
            &format!("{section}.relative_beam_width"),
            self.relative_beam_width,
        )
    }
}
