//! Option normalizer – overlays caller options onto fixed defaults and
//! derives the paper geometry handed to the PDF engine.
//!
//! The merge is shallow: `image`, `html2canvas` and `pagebreak` are replaced
//! as whole blocks when supplied, never merged field by field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::template::Template;

pub const DEFAULT_FILENAME: &str = "document.pdf";
pub const DEFAULT_FORMAT: &str = "a4";
pub const DEFAULT_ORIENTATION: &str = "portrait";
/// Default export margin, in millimetres.
pub const DEFAULT_MARGIN: f32 = 10.0;

// ---------------------------------------------------------------------------
// Caller-facing (partial) options
// ---------------------------------------------------------------------------

/// Partial configuration as supplied by a caller.
///
/// Every field is optional; [`normalize_options`] fills the gaps. Keys this
/// crate does not recognise are collected into `extra` and carried through
/// untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Options {
    #[serde(default, deserialize_with = "lenient_string")]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub orientation: Option<String>,
    /// `None` when the key is absent. A present key always yields a value,
    /// `null` included.
    #[serde(default, deserialize_with = "present_margin")]
    pub margin: Option<MarginValue>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub css: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub header: Option<Template>,
    #[serde(default, deserialize_with = "lenient")]
    pub footer: Option<Template>,
    #[serde(default, deserialize_with = "lenient")]
    pub image: Option<ImageSettings>,
    #[serde(default, deserialize_with = "lenient")]
    pub html2canvas: Option<CaptureSettings>,
    #[serde(default, deserialize_with = "lenient")]
    pub pagebreak: Option<PageBreakSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Options {
    /// Parse options from a JSON object.
    ///
    /// Only malformed JSON or a non-object top level is an error; values of
    /// the wrong type are coerced or dropped.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Strings pass through, numbers and booleans are stringified, anything
/// else counts as not supplied.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => {
            log::warn!("ignoring non-text option value {other}");
            None
        }
    })
}

/// A block of the wrong shape counts as not supplied.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value)
        .map_err(|e| log::warn!("ignoring malformed option block: {e}"))
        .ok())
}

fn present_margin<'de, D>(deserializer: D) -> Result<Option<MarginValue>, D::Error>
where
    D: Deserializer<'de>,
{
    MarginValue::deserialize(deserializer).map(Some)
}

/// A margin as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MarginValue {
    Number(f64),
    Text(String),
    /// `null`, arrays and objects. Coerces to 0.
    Invalid,
}

impl<'de> Deserialize<'de> for MarginValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => MarginValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => MarginValue::Text(s),
            Value::Bool(b) => MarginValue::Number(if b { 1.0 } else { 0.0 }),
            _ => MarginValue::Invalid,
        })
    }
}

impl From<f32> for MarginValue {
    fn from(v: f32) -> Self {
        MarginValue::Number(v as f64)
    }
}

impl From<f64> for MarginValue {
    fn from(v: f64) -> Self {
        MarginValue::Number(v)
    }
}

impl From<&str> for MarginValue {
    fn from(v: &str) -> Self {
        MarginValue::Text(v.to_string())
    }
}

/// Raster settings for embedded images.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ImageSettings {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ImageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
}

/// Capture settings, named after the html2canvas options they mirror.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct CaptureSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(rename = "useCORS", default, skip_serializing_if = "Option::is_none")]
    pub use_cors: Option<bool>,
    #[serde(rename = "scrollX", default, skip_serializing_if = "Option::is_none")]
    pub scroll_x: Option<f32>,
    #[serde(rename = "scrollY", default, skip_serializing_if = "Option::is_none")]
    pub scroll_y: Option<f32>,
    #[serde(rename = "allowTaint", default, skip_serializing_if = "Option::is_none")]
    pub allow_taint: Option<bool>,
}

/// Page-break rules, named after the html2pdf `pagebreak` option.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PageBreakSettings {
    #[serde(default, deserialize_with = "one_or_many")]
    pub mode: Vec<PageBreakMode>,
    /// Selectors that force a break before the matching element.
    #[serde(default, deserialize_with = "one_or_many")]
    pub before: Vec<String>,
    /// Selectors that force a break after the matching element.
    #[serde(default, deserialize_with = "one_or_many")]
    pub after: Vec<String>,
    /// Selectors whose elements must not be split across pages.
    #[serde(default, deserialize_with = "one_or_many")]
    pub avoid: Vec<String>,
}

impl PageBreakSettings {
    /// Modes in effect; an empty list means html2pdf's default of css + legacy.
    pub fn effective_modes(&self) -> Vec<PageBreakMode> {
        if self.mode.is_empty() {
            vec![PageBreakMode::Css, PageBreakMode::Legacy]
        } else {
            self.mode.clone()
        }
    }

    pub fn has_mode(&self, mode: PageBreakMode) -> bool {
        self.effective_modes().contains(&mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageBreakMode {
    /// Honour CSS `page-break-*` / `break-*` properties.
    Css,
    /// Break after elements with class `html2pdf__page-break`.
    Legacy,
    /// Avoid splitting any element across pages.
    AvoidAll,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(v) => vec![v],
        OneOrMany::Many(v) => v,
    })
}

// ---------------------------------------------------------------------------
// Normalized options
// ---------------------------------------------------------------------------

/// Unit of the paper geometry. Fixed to millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Mm,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Mm => "mm",
        }
    }
}

/// Paper geometry handed to the PDF engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperGeometry {
    pub unit: Unit,
    pub format: String,
    pub orientation: String,
}

/// Complete configuration: every recognised key has a value.
#[derive(Debug, Clone)]
pub struct NormalizedOptions {
    pub filename: String,
    pub format: String,
    pub orientation: String,
    /// Export margin in millimetres, never negative.
    pub margin: f32,
    pub css: String,
    pub header: Option<Template>,
    pub footer: Option<Template>,
    pub image: ImageSettings,
    pub html2canvas: CaptureSettings,
    pub pagebreak: PageBreakSettings,
    pub paper: PaperGeometry,
    pub extra: Map<String, Value>,
}

impl Default for NormalizedOptions {
    fn default() -> Self {
        normalize_options(&Options::default())
    }
}

fn default_image() -> ImageSettings {
    ImageSettings {
        kind: Some(ImageType::Jpeg),
        quality: Some(0.98),
    }
}

fn default_capture() -> CaptureSettings {
    CaptureSettings {
        scale: Some(2.0),
        use_cors: Some(true),
        scroll_x: Some(0.0),
        scroll_y: Some(0.0),
        allow_taint: None,
    }
}

fn default_pagebreak() -> PageBreakSettings {
    PageBreakSettings {
        mode: vec![PageBreakMode::Css, PageBreakMode::Legacy],
        ..PageBreakSettings::default()
    }
}

/// Coerce a caller margin to a non-negative number of millimetres.
///
/// Absent, null, empty, non-numeric and non-finite input all become 0.
pub fn coerce_margin(value: Option<&MarginValue>) -> f32 {
    let raw = match value {
        None | Some(MarginValue::Invalid) => 0.0,
        Some(MarginValue::Number(n)) => *n,
        Some(MarginValue::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(0.0)
            }
        }
    };
    if raw.is_finite() && raw > 0.0 {
        raw as f32
    } else {
        0.0
    }
}

/// Overlay `opts` onto the defaults and derive the paper geometry.
pub fn normalize_options(opts: &Options) -> NormalizedOptions {
    let filename = opts
        .filename
        .clone()
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    let format = opts
        .format
        .clone()
        .unwrap_or_else(|| DEFAULT_FORMAT.to_string());
    let orientation = opts
        .orientation
        .clone()
        .unwrap_or_else(|| DEFAULT_ORIENTATION.to_string());

    let margin = match &opts.margin {
        Some(m) => coerce_margin(Some(m)),
        None => DEFAULT_MARGIN,
    };

    let paper = PaperGeometry {
        unit: Unit::Mm,
        format: if format.is_empty() {
            DEFAULT_FORMAT.to_string()
        } else {
            format.clone()
        },
        orientation: if orientation.is_empty() {
            DEFAULT_ORIENTATION.to_string()
        } else {
            orientation.clone()
        },
    };

    let normalized = NormalizedOptions {
        filename,
        format,
        orientation,
        margin,
        css: opts.css.clone().unwrap_or_default(),
        header: opts.header.clone(),
        footer: opts.footer.clone(),
        image: opts.image.clone().unwrap_or_else(default_image),
        html2canvas: opts.html2canvas.clone().unwrap_or_else(default_capture),
        pagebreak: opts.pagebreak.clone().unwrap_or_else(default_pagebreak),
        paper,
        extra: opts.extra.clone(),
    };

    log::debug!(
        "normalized options: file={} paper={}/{} margin={}mm",
        normalized.filename,
        normalized.paper.format,
        normalized.paper.orientation,
        normalized.margin
    );
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_key() {
        let n = normalize_options(&Options::default());
        assert_eq!(n.filename, "document.pdf");
        assert_eq!(n.format, "a4");
        assert_eq!(n.orientation, "portrait");
        assert_eq!(n.margin, 10.0);
        assert_eq!(n.css, "");
        assert!(n.header.is_none());
        assert!(n.footer.is_none());
        assert_eq!(n.image, default_image());
        assert_eq!(n.html2canvas, default_capture());
        assert_eq!(
            n.pagebreak.mode,
            vec![PageBreakMode::Css, PageBreakMode::Legacy]
        );
        assert_eq!(
            n.paper,
            PaperGeometry {
                unit: Unit::Mm,
                format: "a4".into(),
                orientation: "portrait".into(),
            }
        );
    }

    #[test]
    fn supplied_fields_override() {
        let opts = Options {
            filename: Some("out.pdf".into()),
            format: Some("letter".into()),
            orientation: Some("landscape".into()),
            css: Some("h1 { color: #f00 }".into()),
            ..Options::default()
        };
        let n = normalize_options(&opts);
        assert_eq!(n.filename, "out.pdf");
        assert_eq!(n.paper.format, "letter");
        assert_eq!(n.paper.orientation, "landscape");
        assert_eq!(n.css, "h1 { color: #f00 }");
        assert_eq!(n.margin, DEFAULT_MARGIN);
    }

    #[test]
    fn nested_blocks_replace_whole() {
        let opts = Options {
            image: Some(ImageSettings {
                kind: None,
                quality: Some(0.5),
            }),
            html2canvas: Some(CaptureSettings {
                scale: Some(1.0),
                ..CaptureSettings::default()
            }),
            ..Options::default()
        };
        let n = normalize_options(&opts);
        // No deep merge: the default jpeg type is not carried over.
        assert_eq!(n.image.kind, None);
        assert_eq!(n.image.quality, Some(0.5));
        assert_eq!(n.html2canvas.use_cors, None);
        assert_eq!(n.html2canvas.scale, Some(1.0));
    }

    #[test]
    fn margin_coercion() {
        let cases: Vec<(Option<MarginValue>, f32)> = vec![
            (Some(5.0f64.into()), 5.0),
            (Some((-3.0f64).into()), 0.0),
            (Some("12.5".into()), 12.5),
            (Some(" -4 ".into()), 0.0),
            (Some("abc".into()), 0.0),
            (Some("".into()), 0.0),
            (Some(f64::NAN.into()), 0.0),
            (Some(0.0f64.into()), 0.0),
        ];
        for (input, expected) in cases {
            let opts = Options {
                margin: input.clone(),
                ..Options::default()
            };
            assert_eq!(normalize_options(&opts).margin, expected, "input {input:?}");
        }
        assert_eq!(coerce_margin(None), 0.0);
    }

    #[test]
    fn empty_format_falls_back_in_geometry_only() {
        let opts = Options {
            format: Some(String::new()),
            orientation: Some(String::new()),
            ..Options::default()
        };
        let n = normalize_options(&opts);
        assert_eq!(n.format, "");
        assert_eq!(n.paper.format, "a4");
        assert_eq!(n.paper.orientation, "portrait");
    }

    #[test]
    fn json_keys_and_passthrough() {
        let json = r#"{
            "filename": "r.pdf",
            "margin": "8",
            "header": "Page {{page}}",
            "image": { "type": "png", "quality": 0.7 },
            "html2canvas": { "scale": 3, "useCORS": false },
            "pagebreak": { "mode": "avoid-all", "before": ".chapter" },
            "jsPDF": { "compress": true },
            "custom": 42
        }"#;
        let opts = Options::from_json(json).unwrap();
        assert_eq!(opts.extra.get("custom"), Some(&Value::from(42)));
        assert!(opts.extra.contains_key("jsPDF"));

        let n = normalize_options(&opts);
        assert_eq!(n.margin, 8.0);
        assert_eq!(n.image.kind, Some(ImageType::Png));
        assert_eq!(n.html2canvas.use_cors, Some(false));
        assert_eq!(n.pagebreak.mode, vec![PageBreakMode::AvoidAll]);
        assert_eq!(n.pagebreak.before, vec![".chapter".to_string()]);
        assert_eq!(n.extra.get("custom"), Some(&Value::from(42)));
    }

    #[test]
    fn null_margin_is_zero_not_default() {
        let n = normalize_options(&Options::from_json(r#"{"margin": null}"#).unwrap());
        assert_eq!(n.margin, 0.0);
        let n = normalize_options(&Options::from_json("{}").unwrap());
        assert_eq!(n.margin, DEFAULT_MARGIN);
    }

    #[test]
    fn wrongly_typed_values_are_coerced() {
        let opts = Options::from_json(
            r#"{"margin": true, "filename": 5, "format": ["a4"], "image": "png", "header": 3}"#,
        )
        .unwrap();
        let n = normalize_options(&opts);
        assert_eq!(n.margin, 1.0);
        assert_eq!(n.filename, "5");
        assert_eq!(n.paper.format, "a4");
        assert_eq!(n.image, default_image());
        assert!(n.header.is_none());

        let n = normalize_options(&Options::from_json(r#"{"margin": false}"#).unwrap());
        assert_eq!(n.margin, 0.0);
        let n = normalize_options(&Options::from_json(r#"{"margin": {"top": 4}}"#).unwrap());
        assert_eq!(n.margin, 0.0);
    }

    #[test]
    fn empty_mode_list_means_css_and_legacy() {
        let pb = PageBreakSettings::default();
        assert!(pb.has_mode(PageBreakMode::Css));
        assert!(pb.has_mode(PageBreakMode::Legacy));
        assert!(!pb.has_mode(PageBreakMode::AvoidAll));
    }
}
