use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every runtime-tunable value of the showcase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamKey {
    AutoRotateSpeed,
    Damping,
    FloorColor,
    FrameColor,
    LightsEmissionColor,
    LightsEmissionIntensity,
    AmbientIntensity,
    #[serde(rename = "directionalLight1Color")]
    Directional1Color,
    #[serde(rename = "directionalLight1Intensity")]
    Directional1Intensity,
    #[serde(rename = "directionalLight2Color")]
    Directional2Color,
    #[serde(rename = "directionalLight2Intensity")]
    Directional2Intensity,
    Exposure,
    BloomThreshold,
    BloomStrength,
    BloomRadius,
}

/// Value type a key accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Color,
    Scalar,
}

/// Which part of the showcase owns the value behind a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamTarget {
    Controls,
    Scene,
    Pipeline,
}

impl ParamKey {
    pub const ALL: [ParamKey; 15] = [
        ParamKey::AutoRotateSpeed,
        ParamKey::Damping,
        ParamKey::FloorColor,
        ParamKey::FrameColor,
        ParamKey::LightsEmissionColor,
        ParamKey::LightsEmissionIntensity,
        ParamKey::AmbientIntensity,
        ParamKey::Directional1Color,
        ParamKey::Directional1Intensity,
        ParamKey::Directional2Color,
        ParamKey::Directional2Intensity,
        ParamKey::Exposure,
        ParamKey::BloomThreshold,
        ParamKey::BloomStrength,
        ParamKey::BloomRadius,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParamKey::AutoRotateSpeed => "autoRotateSpeed",
            ParamKey::Damping => "damping",
            ParamKey::FloorColor => "floorColor",
            ParamKey::FrameColor => "frameColor",
            ParamKey::LightsEmissionColor => "lightsEmissionColor",
            ParamKey::LightsEmissionIntensity => "lightsEmissionIntensity",
            ParamKey::AmbientIntensity => "ambientIntensity",
            ParamKey::Directional1Color => "directionalLight1Color",
            ParamKey::Directional1Intensity => "directionalLight1Intensity",
            ParamKey::Directional2Color => "directionalLight2Color",
            ParamKey::Directional2Intensity => "directionalLight2Intensity",
            ParamKey::Exposure => "exposure",
            ParamKey::BloomThreshold => "bloomThreshold",
            ParamKey::BloomStrength => "bloomStrength",
            ParamKey::BloomRadius => "bloomRadius",
        }
    }

    /// Accepts the key names used by the panel, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(name))
    }

    pub fn kind(self) -> ParamKind {
        match self {
            ParamKey::FloorColor
            | ParamKey::FrameColor
            | ParamKey::LightsEmissionColor
            | ParamKey::Directional1Color
            | ParamKey::Directional2Color => ParamKind::Color,
            _ => ParamKind::Scalar,
        }
    }

    pub fn target(self) -> ParamTarget {
        match self {
            ParamKey::AutoRotateSpeed | ParamKey::Damping => ParamTarget::Controls,
            ParamKey::Exposure
            | ParamKey::BloomThreshold
            | ParamKey::BloomStrength
            | ParamKey::BloomRadius => ParamTarget::Pipeline,
            _ => ParamTarget::Scene,
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A live parameter value: a `0xRRGGBB` sRGB color or a number.
///
/// In JSON a color is a `"#rrggbb"` string and a scalar a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(f32),
    Color(#[serde(with = "hex_color")] u32),
}

mod hex_color {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hex: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("#{hex:06x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_hex_color(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid color {text:?}")))
    }
}

/// Reads `#rrggbb`, `0xrrggbb` or `rrggbb`.
fn parse_hex_color(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix('#')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.len() != 6 {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

impl ParamValue {
    pub fn kind(self) -> ParamKind {
        match self {
            ParamValue::Color(_) => ParamKind::Color,
            ParamValue::Scalar(_) => ParamKind::Scalar,
        }
    }

    pub fn as_scalar(self) -> Option<f32> {
        match self {
            ParamValue::Scalar(value) => Some(value),
            ParamValue::Color(_) => None,
        }
    }

    pub fn as_color(self) -> Option<u32> {
        match self {
            ParamValue::Color(hex) => Some(hex),
            ParamValue::Scalar(_) => None,
        }
    }

    /// Parses text for `key`: `#rrggbb`, `0xrrggbb` or `rrggbb` for colors,
    /// a decimal number for scalars.
    pub fn parse(key: ParamKey, text: &str) -> Result<Self, ParameterError> {
        let text = text.trim();
        let invalid = || ParameterError::InvalidValue {
            key,
            value: text.to_string(),
        };
        match key.kind() {
            ParamKind::Color => parse_hex_color(text)
                .map(ParamValue::Color)
                .ok_or_else(invalid),
            ParamKind::Scalar => match text.parse::<f32>() {
                Ok(value) if value.is_finite() => Ok(ParamValue::Scalar(value)),
                _ => Err(invalid()),
            },
        }
    }

    /// Checks that the value matches the kind `key` expects.
    pub fn checked_for(self, key: ParamKey) -> Result<Self, ParameterError> {
        if self.kind() == key.kind() {
            Ok(self)
        } else {
            Err(ParameterError::KindMismatch {
                key,
                expected: key.kind(),
            })
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Color(hex) => write!(f, "#{hex:06x}"),
            ParamValue::Scalar(value) => write!(f, "{value:.3}"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("unknown parameter {0:?}")]
    UnknownKey(String),
    #[error("parameter {key} expects a {expected:?} value")]
    KindMismatch { key: ParamKey, expected: ParamKind },
    #[error("invalid value {value:?} for parameter {key}")]
    InvalidValue { key: ParamKey, value: String },
    #[error("parameter {0} is not handled here")]
    WrongTarget(ParamKey),
    #[error("expected key=value, got {0:?}")]
    MalformedAssignment(String),
}

/// Current value of every live parameter, as last applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveParameters {
    values: BTreeMap<ParamKey, ParamValue>,
}

impl Default for LiveParameters {
    fn default() -> Self {
        use ParamKey::*;
        use ParamValue::{Color, Scalar};

        let values = [
            (AutoRotateSpeed, Scalar(-1.0)),
            (Damping, Scalar(0.05)),
            (FloorColor, Color(0x555555)),
            (FrameColor, Color(0x121212)),
            (LightsEmissionColor, Color(0xa8beff)),
            (LightsEmissionIntensity, Scalar(1.0)),
            (AmbientIntensity, Scalar(1.0)),
            (Directional1Color, Color(0xffffff)),
            (Directional1Intensity, Scalar(1.0)),
            (Directional2Color, Color(0xffffff)),
            (Directional2Intensity, Scalar(1.0)),
            (Exposure, Scalar(1.0)),
            (BloomThreshold, Scalar(0.5)),
            (BloomStrength, Scalar(0.6)),
            (BloomRadius, Scalar(0.0)),
        ]
        .into_iter()
        .collect();
        Self { values }
    }
}

impl LiveParameters {
    pub fn get(&self, key: ParamKey) -> Option<ParamValue> {
        self.values.get(&key).copied()
    }

    pub fn scalar(&self, key: ParamKey) -> Option<f32> {
        self.get(key).and_then(ParamValue::as_scalar)
    }

    pub fn color(&self, key: ParamKey) -> Option<u32> {
        self.get(key).and_then(ParamValue::as_color)
    }

    pub(crate) fn record(&mut self, key: ParamKey, value: ParamValue) {
        self.values.insert(key, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, ParamValue)> + '_ {
        self.values.iter().map(|(key, value)| (*key, *value))
    }
}

/// Splits a `key=value` assignment such as `bloomStrength=1.2`.
pub fn parse_assignment(text: &str) -> Result<(ParamKey, ParamValue), ParameterError> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| ParameterError::MalformedAssignment(text.to_string()))?;
    let key =
        ParamKey::from_name(name).ok_or_else(|| ParameterError::UnknownKey(name.to_string()))?;
    Ok((key, ParamValue::parse(key, value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colors_in_common_spellings() {
        for text in ["#a8beff", "0xa8beff", "A8BEFF"] {
            assert_eq!(
                ParamValue::parse(ParamKey::FloorColor, text),
                Ok(ParamValue::Color(0xa8beff))
            );
        }
        assert!(ParamValue::parse(ParamKey::FloorColor, "#fff").is_err());
    }

    #[test]
    fn parses_scalars_and_rejects_nan() {
        assert_eq!(
            ParamValue::parse(ParamKey::Exposure, " 0.5 "),
            Ok(ParamValue::Scalar(0.5))
        );
        assert!(ParamValue::parse(ParamKey::Exposure, "NaN").is_err());
        assert!(ParamValue::parse(ParamKey::Exposure, "bright").is_err());
    }

    #[test]
    fn key_names_round_trip() {
        for key in ParamKey::ALL {
            assert_eq!(ParamKey::from_name(key.name()), Some(key));
        }
        assert_eq!(
            ParamKey::from_name("BLOOMSTRENGTH"),
            Some(ParamKey::BloomStrength)
        );
    }

    #[test]
    fn assignment_parsing_reports_problems() {
        assert_eq!(
            parse_assignment("bloomRadius=0.25"),
            Ok((ParamKey::BloomRadius, ParamValue::Scalar(0.25)))
        );
        assert!(matches!(
            parse_assignment("bloomRadius"),
            Err(ParameterError::MalformedAssignment(_))
        ));
        assert!(matches!(
            parse_assignment("glow=1"),
            Err(ParameterError::UnknownKey(_))
        ));
    }

    #[test]
    fn defaults_cover_every_key_with_matching_kind() {
        let params = LiveParameters::default();
        for key in ParamKey::ALL {
            let value = params.get(key).expect("default present");
            assert_eq!(value.kind(), key.kind(), "{key}");
        }
    }

    #[test]
    fn json_numbers_are_scalars_and_colors_are_strings() {
        assert_eq!(
            serde_json::from_str::<ParamValue>("1").unwrap(),
            ParamValue::Scalar(1.0)
        );
        assert_eq!(
            serde_json::from_str::<ParamValue>("\"#a8beff\"").unwrap(),
            ParamValue::Color(0xa8beff)
        );
        assert_eq!(
            serde_json::to_string(&ParamValue::Color(0x121212)).unwrap(),
            "\"#121212\""
        );
        assert!(serde_json::from_str::<ParamValue>("\"#12\"").is_err());
    }

    #[test]
    fn serialized_keys_match_their_names() {
        for key in ParamKey::ALL {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.name()));
        }
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let err = ParamValue::Scalar(1.0)
            .checked_for(ParamKey::FrameColor)
            .unwrap_err();
        assert_eq!(
            err,
            ParameterError::KindMismatch {
                key: ParamKey::FrameColor,
                expected: ParamKind::Color
            }
        );
    }
}
