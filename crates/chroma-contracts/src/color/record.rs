use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LookupError;

/// Rendered in place of a Lab channel the model did not supply.
pub const LAB_PLACEHOLDER: &str = "--";

const LUMINANCE_DARK_THRESHOLD: f64 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Lab {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
}

/// One matched standard color.
///
/// Only `code` is guaranteed. Everything else comes from free-form model
/// output and is kept optional; rendering helpers supply the defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    pub code: String,
    #[serde(rename = "nameEN", default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(rename = "nameZH", default, skip_serializing_if = "Option::is_none")]
    pub name_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgb: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<Lab>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColorRecord {
    /// Builds a record from one element of a normalized response.
    ///
    /// Fields of the wrong JSON type are dropped instead of failing the
    /// record. A missing or blank `code` is the only hard failure.
    pub fn from_value(value: &Value) -> Result<Self, LookupError> {
        let Some(object) = value.as_object() else {
            return Err(LookupError::UnexpectedShape);
        };
        let code = code_text(object.get("code")).ok_or(LookupError::UnexpectedShape)?;
        Ok(Self {
            library: non_empty_text(object.get("library")),
            code,
            name_en: non_empty_text(object.get("nameEN")),
            name_zh: non_empty_text(object.get("nameZH")),
            hex: non_empty_text(object.get("hex")),
            rgb: object.get("rgb").and_then(|raw| {
                channel_triple(raw, ["r", "g", "b"]).map(|[r, g, b]| Rgb { r, g, b })
            }),
            lab: object.get("lab").and_then(|raw| {
                channel_triple(raw, ["l", "a", "b"]).map(|[l, a, b]| Lab { l, a, b })
            }),
            description: non_empty_text(object.get("description")),
        })
    }

    pub fn is_structurally_valid(&self) -> bool {
        !self.code.trim().is_empty()
    }

    /// RGB channels with white standing in for anything missing.
    pub fn display_rgb(&self) -> (f64, f64, f64) {
        let rgb = self.rgb.unwrap_or_default();
        (
            rgb.r.unwrap_or(255.0),
            rgb.g.unwrap_or(255.0),
            rgb.b.unwrap_or(255.0),
        )
    }

    pub fn is_dark(&self) -> bool {
        let (r, g, b) = self.display_rgb();
        r * 0.299 + g * 0.587 + b * 0.114 < LUMINANCE_DARK_THRESHOLD
    }

    pub fn normalized_hex(&self) -> Option<String> {
        normalize_hex_color(self.hex.as_deref()?)
    }

    /// Swatch color, falling back to white like the card background does.
    pub fn swatch_hex(&self) -> String {
        self.normalized_hex()
            .unwrap_or_else(|| "#FFFFFF".to_string())
    }

    /// `None` when the record carries no Lab block at all.
    pub fn lab_display(&self) -> Option<[String; 3]> {
        let lab = self.lab?;
        let show = |channel: Option<f64>| {
            channel
                .map(|value| format!("{value:.1}"))
                .unwrap_or_else(|| LAB_PLACEHOLDER.to_string())
        };
        Some([show(lab.l), show(lab.a), show(lab.b)])
    }
}

/// Shortest display form of a channel value: `255`, `12.5`, `-3`.
pub fn format_number(value: f64) -> String {
    format!("{value}")
}

fn code_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn non_empty_text(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn channel_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn channel_triple(value: &Value, keys: [&str; 3]) -> Option<[Option<f64>; 3]> {
    let channels = match value {
        Value::Object(object) => channels_from_object(object, keys),
        Value::Array(items) if items.len() == 3 => [
            channel_value(&items[0]),
            channel_value(&items[1]),
            channel_value(&items[2]),
        ],
        _ => return None,
    };
    if channels.iter().all(Option::is_none) {
        return None;
    }
    Some(channels)
}

fn channels_from_object(object: &Map<String, Value>, keys: [&str; 3]) -> [Option<f64>; 3] {
    keys.map(|key| object.get(key).and_then(channel_value))
}

fn normalize_hex_color(value: &str) -> Option<String> {
    let raw = value.trim();
    if !raw.starts_with('#') {
        return None;
    }
    let mut body = raw.trim_start_matches('#').to_string();
    if body.len() == 3 && body.chars().all(|ch| ch.is_ascii_hexdigit()) {
        body = body.chars().flat_map(|ch| [ch, ch]).collect::<String>();
    }
    if body.len() != 6 || !body.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", body.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{format_number, ColorRecord, Lab, Rgb};
    use crate::error::LookupError;

    #[test]
    fn from_value_reads_full_record() -> anyhow::Result<()> {
        let record = ColorRecord::from_value(&json!({
            "library": "RAL Classic",
            "code": "RAL 7035",
            "nameEN": "Light grey",
            "nameZH": "浅灰色",
            "hex": "#cbd0cc",
            "rgb": {"r": 203, "g": 208, "b": 204},
            "lab": {"l": 83.1, "a": -1.6, "b": 1.2},
            "description": "Common cabinet grey."
        }))?;
        assert_eq!(record.library.as_deref(), Some("RAL Classic"));
        assert_eq!(record.code, "RAL 7035");
        assert_eq!(record.name_zh.as_deref(), Some("浅灰色"));
        assert_eq!(record.normalized_hex().as_deref(), Some("#CBD0CC"));
        assert_eq!(
            record.rgb,
            Some(Rgb {
                r: Some(203.0),
                g: Some(208.0),
                b: Some(204.0)
            })
        );
        assert_eq!(
            record.lab_display(),
            Some(["83.1".to_string(), "-1.6".to_string(), "1.2".to_string()])
        );
        Ok(())
    }

    #[test]
    fn from_value_requires_code() {
        assert!(matches!(
            ColorRecord::from_value(&json!({"nameEN": "Grey"})),
            Err(LookupError::UnexpectedShape)
        ));
        assert!(matches!(
            ColorRecord::from_value(&json!({"code": "   "})),
            Err(LookupError::UnexpectedShape)
        ));
        assert!(matches!(
            ColorRecord::from_value(&json!(["7035"])),
            Err(LookupError::UnexpectedShape)
        ));
    }

    #[test]
    fn from_value_tolerates_loose_fields() -> anyhow::Result<()> {
        let record = ColorRecord::from_value(&json!({
            "code": 7035,
            "nameEN": 12,
            "nameZH": "",
            "rgb": [10, "20", null],
            "lab": "unknown"
        }))?;
        assert_eq!(record.code, "7035");
        assert!(record.name_en.is_none());
        assert!(record.name_zh.is_none());
        assert_eq!(record.display_rgb(), (10.0, 20.0, 255.0));
        assert!(record.lab.is_none());
        assert!(record.lab_display().is_none());
        Ok(())
    }

    #[test]
    fn missing_rgb_renders_as_white() {
        let record = ColorRecord {
            code: "9010".to_string(),
            ..ColorRecord::default()
        };
        assert_eq!(record.display_rgb(), (255.0, 255.0, 255.0));
        assert!(!record.is_dark());
        assert_eq!(record.swatch_hex(), "#FFFFFF");
    }

    #[test]
    fn partial_lab_uses_placeholder() {
        let record = ColorRecord {
            code: "19-4052".to_string(),
            lab: Some(Lab {
                l: Some(31.0),
                a: None,
                b: Some(-40.26),
            }),
            ..ColorRecord::default()
        };
        assert_eq!(
            record.lab_display(),
            Some(["31.0".to_string(), "--".to_string(), "-40.3".to_string()])
        );
    }

    #[test]
    fn dark_swatches_flip_text_color() {
        let record = ColorRecord {
            code: "7016".to_string(),
            rgb: Some(Rgb {
                r: Some(56.0),
                g: Some(62.0),
                b: Some(66.0),
            }),
            ..ColorRecord::default()
        };
        assert!(record.is_dark());
    }

    #[test]
    fn short_and_malformed_hex() {
        let mut record = ColorRecord {
            code: "x".to_string(),
            hex: Some("#abc".to_string()),
            ..ColorRecord::default()
        };
        assert_eq!(record.normalized_hex().as_deref(), Some("#AABBCC"));
        record.hex = Some("C5C7C4".to_string());
        assert!(record.normalized_hex().is_none());
        assert_eq!(record.swatch_hex(), "#FFFFFF");
    }

    #[test]
    fn serializes_with_wire_keys() -> anyhow::Result<()> {
        let record = ColorRecord {
            code: "13-1023".to_string(),
            name_en: Some("Peach Fuzz".to_string()),
            ..ColorRecord::default()
        };
        let value = serde_json::to_value(&record)?;
        assert_eq!(value, json!({"code": "13-1023", "nameEN": "Peach Fuzz"}));
        let back: ColorRecord = serde_json::from_value(value)?;
        assert_eq!(back, record);
        assert_eq!(
            serde_json::from_value::<ColorRecord>(json!({"code": "1"}))?.rgb,
            None
        );
        Ok(())
    }

    #[test]
    fn numbers_use_shortest_form() {
        assert_eq!(format_number(255.0), "255");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(-3.0), "-3");
    }
}
