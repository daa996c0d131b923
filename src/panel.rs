//! Debug parameter panel: the control layout handed to the host UI and the
//! router that turns a control edit into a live parameter change.

use serde::Serialize;

use crate::params::{ParamKey, ParamValue, ParameterError};

/// Receives live parameter changes.
pub trait ParameterSink {
    fn set_live_parameter(&mut self, key: ParamKey, value: ParamValue)
        -> Result<(), ParameterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlKind {
    Slider {
        min: f32,
        max: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<f32>,
    },
    Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSpec {
    pub key: ParamKey,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: ControlKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderSpec {
    pub title: &'static str,
    pub controls: Vec<ControlSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelSchema {
    pub width: u32,
    pub collapsed: bool,
    pub folders: Vec<FolderSpec>,
}

fn slider(key: ParamKey, label: &'static str, min: f32, max: f32, step: Option<f32>) -> ControlSpec {
    ControlSpec {
        key,
        label,
        kind: ControlKind::Slider { min, max, step },
    }
}

fn color(key: ParamKey, label: &'static str) -> ControlSpec {
    ControlSpec {
        key,
        label,
        kind: ControlKind::Color,
    }
}

impl PanelSchema {
    pub fn standard() -> Self {
        use ParamKey::*;

        Self {
            width: 400,
            collapsed: true,
            folders: vec![
                FolderSpec {
                    title: "Controls",
                    controls: vec![
                        slider(AutoRotateSpeed, "Auto Rotate Speed", -5.0, 5.0, Some(0.1)),
                        slider(Damping, "Damping", 0.01, 0.5, Some(0.01)),
                    ],
                },
                FolderSpec {
                    title: "Objects",
                    controls: vec![
                        color(FloorColor, "Floor Color"),
                        color(FrameColor, "Frame Color"),
                        color(LightsEmissionColor, "Lights Emission Color"),
                        slider(
                            LightsEmissionIntensity,
                            "Lights Emission Intensity",
                            0.0,
                            5.0,
                            Some(0.001),
                        ),
                    ],
                },
                FolderSpec {
                    title: "Lighting",
                    controls: vec![
                        slider(AmbientIntensity, "Ambient Intensity", 0.0, 5.0, Some(0.001)),
                        color(Directional1Color, "Directional 1 Color"),
                        slider(
                            Directional1Intensity,
                            "Directional 1 Intensity",
                            0.0,
                            5.0,
                            Some(0.001),
                        ),
                        color(Directional2Color, "Directional 2 Color"),
                        slider(
                            Directional2Intensity,
                            "Directional 2 Intensity",
                            0.0,
                            5.0,
                            Some(0.001),
                        ),
                    ],
                },
                FolderSpec {
                    title: "Post Processing",
                    controls: vec![
                        slider(Exposure, "exposure", 0.1, 2.0, None),
                        slider(BloomThreshold, "bloomThreshold", 0.0, 1.0, None),
                        slider(BloomStrength, "bloomStrength", 0.0, 3.0, None),
                        slider(BloomRadius, "bloomRadius", 0.0, 1.0, Some(0.01)),
                    ],
                },
            ],
        }
    }

    pub fn control(&self, key: ParamKey) -> Option<&ControlSpec> {
        self.folders
            .iter()
            .flat_map(|folder| folder.controls.iter())
            .find(|control| control.key == key)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Routes control edits to a [`ParameterSink`], keeping values inside the
/// control's range and on its step grid.
#[derive(Debug, Clone)]
pub struct ConfigPanel {
    schema: PanelSchema,
}

impl Default for ConfigPanel {
    fn default() -> Self {
        Self::new(PanelSchema::standard())
    }
}

impl ConfigPanel {
    pub fn new(schema: PanelSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &PanelSchema {
        &self.schema
    }

    /// Normalizes `value` for `key` the way the control would.
    pub fn normalize(&self, key: ParamKey, value: ParamValue) -> Result<ParamValue, ParameterError> {
        let value = value.checked_for(key)?;
        let Some(control) = self.schema.control(key) else {
            return Ok(value);
        };
        match (control.kind, value) {
            (ControlKind::Slider { min, max, step }, ParamValue::Scalar(raw)) => {
                let mut snapped = raw;
                if let Some(step) = step.filter(|step| *step > 0.0) {
                    snapped = (snapped / step).round() * step;
                }
                Ok(ParamValue::Scalar(snapped.clamp(min, max)))
            }
            (ControlKind::Color, ParamValue::Color(hex)) => Ok(ParamValue::Color(hex & 0xff_ffff)),
            _ => Err(ParameterError::KindMismatch {
                key,
                expected: key.kind(),
            }),
        }
    }

    /// Applies an edit and returns the value that reached the sink.
    pub fn edit<S: ParameterSink + ?Sized>(
        &self,
        sink: &mut S,
        key: ParamKey,
        value: ParamValue,
    ) -> Result<ParamValue, ParameterError> {
        let value = self.normalize(key, value)?;
        sink.set_live_parameter(key, value)?;
        Ok(value)
    }

    /// Applies an edit given as text, e.g. from the command line or the page.
    pub fn edit_text<S: ParameterSink + ?Sized>(
        &self,
        sink: &mut S,
        name: &str,
        text: &str,
    ) -> Result<ParamValue, ParameterError> {
        let key =
            ParamKey::from_name(name).ok_or_else(|| ParameterError::UnknownKey(name.to_string()))?;
        let value = ParamValue::parse(key, text)?;
        self.edit(sink, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<(ParamKey, ParamValue)>);

    impl ParameterSink for Recorder {
        fn set_live_parameter(
            &mut self,
            key: ParamKey,
            value: ParamValue,
        ) -> Result<(), ParameterError> {
            self.0.push((key, value));
            Ok(())
        }
    }

    #[test]
    fn every_key_has_exactly_one_control() {
        let schema = PanelSchema::standard();
        for key in ParamKey::ALL {
            let count = schema
                .folders
                .iter()
                .flat_map(|folder| folder.controls.iter())
                .filter(|control| control.key == key)
                .count();
            assert_eq!(count, 1, "{key}");
        }
        let titles: Vec<_> = schema.folders.iter().map(|f| f.title).collect();
        assert_eq!(
            titles,
            vec!["Controls", "Objects", "Lighting", "Post Processing"]
        );
        assert!(schema.collapsed);
    }

    #[test]
    fn sliders_clamp_and_snap() {
        let panel = ConfigPanel::default();
        let mut sink = Recorder::default();
        let applied = panel
            .edit(&mut sink, ParamKey::BloomStrength, ParamValue::Scalar(7.0))
            .unwrap();
        assert_eq!(applied, ParamValue::Scalar(3.0));
        let applied = panel
            .edit(&mut sink, ParamKey::BloomRadius, ParamValue::Scalar(0.234))
            .unwrap();
        let radius = applied.as_scalar().unwrap();
        assert!((radius - 0.23).abs() < 1e-6);
        assert_eq!(sink.0.len(), 2);
    }

    #[test]
    fn wrong_kind_never_reaches_the_sink() {
        let panel = ConfigPanel::default();
        let mut sink = Recorder::default();
        assert!(panel
            .edit(&mut sink, ParamKey::FloorColor, ParamValue::Scalar(1.0))
            .is_err());
        assert!(sink.0.is_empty());
    }

    #[test]
    fn text_edits_are_parsed_by_key() {
        let panel = ConfigPanel::default();
        let mut sink = Recorder::default();
        panel
            .edit_text(&mut sink, "directionalLight1Color", "#ff0000")
            .unwrap();
        assert_eq!(
            sink.0,
            vec![(ParamKey::Directional1Color, ParamValue::Color(0xff0000))]
        );
        assert!(matches!(
            panel.edit_text(&mut sink, "sunColor", "#ff0000"),
            Err(ParameterError::UnknownKey(_))
        ));
    }

    #[test]
    fn schema_serializes_for_the_page() {
        let json = PanelSchema::standard().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = &value["folders"][3]["controls"][0];
        assert_eq!(first["key"], "exposure");
        assert_eq!(first["type"], "slider");
        assert!(first.get("step").is_none());
        assert_eq!(value["folders"][1]["controls"][0]["type"], "color");
    }

    #[test]
    fn schema_keys_are_accepted_back_by_name() {
        let json = PanelSchema::standard().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let mut seen = Vec::new();
        for folder in value["folders"].as_array().unwrap() {
            for control in folder["controls"].as_array().unwrap() {
                let name = control["key"].as_str().unwrap();
                let key = ParamKey::from_name(name)
                    .unwrap_or_else(|| panic!("{name} is not a known parameter"));
                seen.push(key);
            }
        }
        assert_eq!(seen.len(), ParamKey::ALL.len());

        let panel = ConfigPanel::default();
        let mut sink = Recorder::default();
        panel
            .edit_text(&mut sink, "directionalLight2Intensity", "2.5")
            .unwrap();
        assert_eq!(
            sink.0,
            vec![(ParamKey::Directional2Intensity, ParamValue::Scalar(2.5))]
        );
    }
}
