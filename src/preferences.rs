//! Advertising preferences consumed by the endpoints and the decision policy
//!
//! The persisted preference store itself lives outside this crate. The engine
//! only needs a snapshot of its four categories (digital signage, predefined
//! ads, dynamic ads, price), which can be loaded from a JSON file and shared
//! through a [`PreferencesHandle`]. Every field has the preference store's
//! default, so a partial file only overrides what it names.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

pub const DEFAULT_PREDEFINED_SERVICE_PATH: &str = "/ase/predef/query/ad";
pub const DEFAULT_DYNAMIC_SERVICE_PATH: &str = "/aig/minf";
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_output";
pub const FALLBACK_CONCEPT: &str = "Healthy";

/// Kind of one slot in the output sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotKind {
    /// Lookup of an existing ad by similarity
    Predefined,
    /// Freshly synthesized ad
    Dynamic,
}

impl SlotKind {
    pub fn default_sequence() -> Vec<SlotKind> {
        vec![SlotKind::Predefined, SlotKind::Dynamic, SlotKind::Predefined]
    }
}

/// Parse an output sequence such as `"[PREDEFINED, DYNAMIC, 'PREDEFINED']"`
///
/// Anything other than the two slot tokens makes the whole text invalid and
/// yields the default sequence. Blank text yields an empty sequence.
pub fn parse_output_sequence(text: &str) -> Vec<SlotKind> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '\'' | '"'))
        .collect();

    let mut sequence = Vec::new();
    for token in cleaned.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token {
            "PREDEFINED" => sequence.push(SlotKind::Predefined),
            "DYNAMIC" => sequence.push(SlotKind::Dynamic),
            _ => return SlotKind::default_sequence(),
        }
    }
    sequence
}

fn deserialize_sequence<'de, D>(deserializer: D) -> Result<Vec<SlotKind>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSequence {
        List(Vec<SlotKind>),
        Text(String),
    }

    Ok(match RawSequence::deserialize(deserializer)? {
        RawSequence::List(list) => list,
        RawSequence::Text(text) => parse_output_sequence(&text),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignageSettings {
    /// Minimum seconds between two publishes on the same feed
    #[serde(rename = "min_time_between_adsubmission")]
    pub min_secs_between_ads: u64,
    #[serde(deserialize_with = "deserialize_sequence")]
    pub output_sequence: Vec<SlotKind>,
    pub output_suffix: String,
    pub output_add_animation: bool,
    pub output_animation_min_ms_per_img: u64,
    pub default_concept: String,
    pub use_default_ad_when_emptyresult: bool,
}

impl Default for SignageSettings {
    fn default() -> Self {
        Self {
            min_secs_between_ads: 90,
            output_sequence: SlotKind::default_sequence(),
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            output_add_animation: true,
            output_animation_min_ms_per_img: 1000,
            default_concept: "healthy food".to_string(),
            use_default_ad_when_emptyresult: true,
        }
    }
}

impl SignageSettings {
    /// Output topic suffix restricted to `[A-Za-z0-9_]`
    pub fn sanitized_suffix(&self) -> String {
        let cleaned: String = self
            .output_suffix
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if cleaned.is_empty() {
            DEFAULT_OUTPUT_SUFFIX.to_string()
        } else {
            cleaned
        }
    }

    /// Feed concept, else the configured default, else a fixed fallback
    pub fn resolve_concept(&self, concept: Option<&str>) -> String {
        [concept, Some(self.default_concept.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|c| !c.is_empty())
            .unwrap_or(FALLBACK_CONCEPT)
            .to_string()
    }
}

/// Overlay and query knobs for one ad kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdStyle {
    pub enable_logo: bool,
    pub logo_halign: String,
    pub logo_valign: String,
    pub logo_percentage: f64,
    pub logo_margin_px: u32,

    pub enable_slogan_definition: bool,
    pub slogan_text: String,
    pub slogan_text_color: String,
    pub slogan_font_size: u32,
    pub slogan_halign: String,
    pub slogan_valign: String,
    pub slogan_marperc_from_border: f64,
    pub slogan_line_width: u32,

    pub enable_price: bool,
    pub price_text_color: String,
    pub price_font_size: u32,
    pub price_line_width: u32,
    pub price_in_circle: bool,
    pub price_circle_color: String,
    pub price_halign: String,
    pub price_valign: String,
    pub price_marperc_from_border: f64,

    pub enable_promotional_text: bool,
    pub promo_text: String,
    pub promo_text_color: String,
    pub promo_font_size: u32,
    pub promo_line_width: u32,
    pub promo_rect_color: String,
    pub promo_rect_padding: u32,
    pub promo_rect_radius: u32,
    pub promo_halign: String,
    pub promo_valign: String,
    pub promo_marperc_from_border: f64,

    pub enable_frame: bool,
    pub frame_marperc_from_border: f64,

    pub query_device: String,
    /// Appended to every query, e.g. picture quality hints
    pub query_complement: String,
    /// Path on the generation service; `None` uses the per-kind default
    pub service_path: Option<String>,
}

impl Default for AdStyle {
    fn default() -> Self {
        Self {
            enable_logo: true,
            logo_halign: "left".to_string(),
            logo_valign: "top".to_string(),
            logo_percentage: 15.0,
            logo_margin_px: 10,

            enable_slogan_definition: true,
            slogan_text: "The Best price in town".to_string(),
            slogan_text_color: "white".to_string(),
            slogan_font_size: 18,
            slogan_halign: "right".to_string(),
            slogan_valign: "top".to_string(),
            slogan_marperc_from_border: 5.0,
            slogan_line_width: 20,

            enable_price: true,
            price_text_color: "white".to_string(),
            price_font_size: 24,
            price_line_width: 5,
            price_in_circle: true,
            price_circle_color: "black".to_string(),
            price_halign: "right".to_string(),
            price_valign: "bottom".to_string(),
            price_marperc_from_border: 10.0,

            enable_promotional_text: true,
            promo_text: "Get one pound and get 50% off in the second!".to_string(),
            promo_text_color: "white".to_string(),
            promo_font_size: 20,
            promo_line_width: 10,
            promo_rect_color: "black".to_string(),
            promo_rect_padding: 10,
            promo_rect_radius: 20,
            promo_halign: "left".to_string(),
            promo_valign: "bottom".to_string(),
            promo_marperc_from_border: 10.0,

            enable_frame: true,
            frame_marperc_from_border: 5.0,

            query_device: "GPU".to_string(),
            query_complement: "8k".to_string(),
            service_path: None,
        }
    }
}

impl AdStyle {
    pub fn service_path_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.service_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceSettings {
    /// Base URL; the item id is appended as the last path segment
    pub endpoint: String,
    /// Response key holding the price
    pub pricetag: String,
    /// Response key holding the unit
    pub unittag: String,
    pub gral_percentage_discount: f64,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/bor/price".to_string(),
            pricetag: "price".to_string(),
            unittag: "unit".to_string(),
            gral_percentage_discount: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub digital_signage: SignageSettings,
    pub predefined_ads: AdStyle,
    pub dynamic_ads: AdStyle,
    pub price: PriceSettings,
}

#[derive(Debug)]
pub enum PreferencesError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for PreferencesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreferencesError::Io(e) => write!(f, "Preferences file error: {}", e),
            PreferencesError::Parse(e) => write!(f, "Preferences parse error: {}", e),
        }
    }
}

impl std::error::Error for PreferencesError {}

impl From<std::io::Error> for PreferencesError {
    fn from(e: std::io::Error) -> Self {
        PreferencesError::Io(e)
    }
}

impl From<serde_json::Error> for PreferencesError {
    fn from(e: serde_json::Error) -> Self {
        PreferencesError::Parse(e)
    }
}

impl Preferences {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Shared, thread-safe access to the current preferences
#[derive(Debug, Clone, Default)]
pub struct PreferencesHandle {
    inner: Arc<RwLock<Preferences>>,
}

impl PreferencesHandle {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            inner: Arc::new(RwLock::new(preferences)),
        }
    }

    pub fn snapshot(&self) -> Preferences {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Takes effect for endpoints built afterwards (see `EndpointRegistry::regenerate`)
    pub fn replace(&self, preferences: Preferences) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = preferences;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_preference_store() {
        let prefs = Preferences::default();
        let ds = &prefs.digital_signage;
        assert_eq!(ds.min_secs_between_ads, 90);
        assert_eq!(ds.output_sequence, SlotKind::default_sequence());
        assert_eq!(ds.sanitized_suffix(), "_output");
        assert!(ds.output_add_animation);
        assert_eq!(prefs.predefined_ads.query_complement, "8k");
        assert_eq!(
            prefs.dynamic_ads.service_path_or(DEFAULT_DYNAMIC_SERVICE_PATH),
            "/aig/minf"
        );
    }

    #[test]
    fn test_parse_output_sequence() {
        assert_eq!(
            parse_output_sequence("[PREDEFINED, DYNAMIC]"),
            vec![SlotKind::Predefined, SlotKind::Dynamic]
        );
        assert_eq!(
            parse_output_sequence("['DYNAMIC','DYNAMIC']"),
            vec![SlotKind::Dynamic, SlotKind::Dynamic]
        );
        // Unknown tokens fall back to the default sequence
        assert_eq!(parse_output_sequence("PREDEFINED, VIDEO"), SlotKind::default_sequence());
        assert!(parse_output_sequence("  ").is_empty());
    }

    #[test]
    fn test_suffix_is_sanitized() {
        let mut ds = SignageSettings::default();
        ds.output_suffix = "/out-put#1".to_string();
        assert_eq!(ds.sanitized_suffix(), "output1");

        ds.output_suffix = "//".to_string();
        assert_eq!(ds.sanitized_suffix(), "_output");
    }

    #[test]
    fn test_concept_resolution() {
        let mut ds = SignageSettings::default();
        assert_eq!(ds.resolve_concept(Some("fresh fruit")), "fresh fruit");
        assert_eq!(ds.resolve_concept(Some("  ")), "healthy food");
        assert_eq!(ds.resolve_concept(None), "healthy food");

        ds.default_concept = String::new();
        assert_eq!(ds.resolve_concept(None), "Healthy");
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "digital_signage": {{
                    "min_time_between_adsubmission": 30,
                    "output_sequence": "[DYNAMIC, PREDEFINED]"
                }},
                "dynamic_ads": {{ "query_complement": "photorealistic" }},
                "price": {{ "gral_percentage_discount": 15.0 }}
            }}"#
        )
        .unwrap();

        let prefs = Preferences::load_from_file(file.path()).unwrap();
        assert_eq!(prefs.digital_signage.min_secs_between_ads, 30);
        assert_eq!(
            prefs.digital_signage.output_sequence,
            vec![SlotKind::Dynamic, SlotKind::Predefined]
        );
        assert_eq!(prefs.digital_signage.output_suffix, "_output");
        assert_eq!(prefs.dynamic_ads.query_complement, "photorealistic");
        assert_eq!(prefs.dynamic_ads.logo_halign, "left");
        assert_eq!(prefs.price.gral_percentage_discount, 15.0);
        assert_eq!(prefs.price.pricetag, "price");
    }

    #[test]
    fn test_bad_file_reports_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            Preferences::load_from_file(file.path()),
            Err(PreferencesError::Parse(_))
        ));
        assert!(matches!(
            Preferences::load_from_file("/nonexistent/prefs.json"),
            Err(PreferencesError::Io(_))
        ));
    }

    #[test]
    fn test_handle_replace_is_visible_to_new_snapshots() {
        let handle = PreferencesHandle::new(Preferences::default());
        let before = handle.snapshot();

        let mut updated = before.clone();
        updated.digital_signage.min_secs_between_ads = 5;
        handle.replace(updated);

        assert_eq!(before.digital_signage.min_secs_between_ads, 90);
        assert_eq!(handle.snapshot().digital_signage.min_secs_between_ads, 5);
    }
}
