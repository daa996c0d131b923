use std::collections::BTreeMap;

use roxmltree::{Document, Node};
use thiserror::Error;

use crate::params::{ParamKey, ParamValue, ParameterError};
use crate::policy::Role;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("root element must be <showcase>, found <{0}>")]
    UnexpectedRoot(String),
    #[error("<{tag}> is missing its {attribute:?} attribute")]
    MissingAttribute {
        tag: &'static str,
        attribute: &'static str,
    },
    #[error("unknown role {0:?}")]
    UnknownRole(String),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Startup settings: asset locations, extra part names and initial
/// parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowcaseConfig {
    pub asset: String,
    pub floor_shadow: String,
    pub floor_alpha: String,
    pub role_aliases: BTreeMap<Role, Vec<String>>,
    pub parameters: Vec<(ParamKey, ParamValue)>,
}

impl Default for ShowcaseConfig {
    fn default() -> Self {
        Self {
            asset: "models/Cube.glb".to_string(),
            floor_shadow: "textures/FloorShadow.png".to_string(),
            floor_alpha: "textures/FloorAlpha.jpg".to_string(),
            role_aliases: BTreeMap::new(),
            parameters: Vec::new(),
        }
    }
}

impl ShowcaseConfig {
    /// Parses a configuration document; absent elements keep their defaults.
    ///
    /// ```xml
    /// <showcase>
    ///     <asset>models/Cube.glb</asset>
    ///     <floorShadow>textures/FloorShadow.png</floorShadow>
    ///     <floorAlpha>textures/FloorAlpha.jpg</floorAlpha>
    ///     <roles>
    ///         <role name="background">Backdrop</role>
    ///     </roles>
    ///     <parameter key="bloomStrength">0.8</parameter>
    /// </showcase>
    /// ```
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        let document = Document::parse(xml)?;
        let root = document.root_element();
        if !root.has_tag_name("showcase") {
            return Err(ConfigError::UnexpectedRoot(
                root.tag_name().name().to_string(),
            ));
        }

        let mut config = Self::default();
        if let Some(asset) = optional_text(&root, "asset") {
            config.asset = asset;
        }
        if let Some(path) = optional_text(&root, "floorShadow") {
            config.floor_shadow = path;
        }
        if let Some(path) = optional_text(&root, "floorAlpha") {
            config.floor_alpha = path;
        }

        for node in root.descendants().filter(|n| n.has_tag_name("role")) {
            let name = required_attribute(&node, "role", "name")?;
            let role = Role::from_name(name).ok_or_else(|| ConfigError::UnknownRole(name.to_string()))?;
            if let Some(alias) = node_text(&node) {
                config.role_aliases.entry(role).or_default().push(alias);
            }
        }

        for node in root.children().filter(|n| n.has_tag_name("parameter")) {
            let name = required_attribute(&node, "parameter", "key")?;
            let key = ParamKey::from_name(name)
                .ok_or_else(|| ParameterError::UnknownKey(name.to_string()))?;
            let text = node_text(&node).unwrap_or_default();
            config.parameters.push((key, ParamValue::parse(key, &text)?));
        }

        Ok(config)
    }
}

fn required_attribute<'a>(
    node: &Node<'a, '_>,
    tag: &'static str,
    attribute: &'static str,
) -> Result<&'a str, ConfigError> {
    node.attribute(attribute)
        .ok_or(ConfigError::MissingAttribute { tag, attribute })
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| node_text(&child))
}

fn node_text(node: &Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <showcase>
        <asset>models/Display.glb</asset>
        <roles>
            <role name="background">Backdrop</role>
            <role name="Frame">Case</role>
        </roles>
        <parameter key="bloomStrength">1.25</parameter>
        <parameter key="floorColor">#202020</parameter>
    </showcase>
    "#;

    #[test]
    fn parse_config_overrides_defaults() {
        let config = ShowcaseConfig::from_xml(SAMPLE).unwrap();
        assert_eq!(config.asset, "models/Display.glb");
        assert_eq!(config.floor_shadow, "textures/FloorShadow.png");
        assert_eq!(
            config.role_aliases[&Role::Background],
            vec!["Backdrop".to_string()]
        );
        assert_eq!(config.role_aliases[&Role::Frame], vec!["Case".to_string()]);
        assert_eq!(
            config.parameters,
            vec![
                (ParamKey::BloomStrength, ParamValue::Scalar(1.25)),
                (ParamKey::FloorColor, ParamValue::Color(0x202020)),
            ]
        );
    }

    #[test]
    fn wrong_root_is_an_error() {
        let err = ShowcaseConfig::from_xml("<scene/>").unwrap_err();
        assert!(matches!(err, ConfigError::UnexpectedRoot(ref name) if name == "scene"));
    }

    #[test]
    fn unknown_role_is_an_error() {
        let xml = r#"<showcase><roles><role name="roof">Top</role></roles></showcase>"#;
        assert!(matches!(
            ShowcaseConfig::from_xml(xml),
            Err(ConfigError::UnknownRole(_))
        ));
    }

    #[test]
    fn bad_parameter_value_is_an_error() {
        let xml = r#"<showcase><parameter key="exposure">bright</parameter></showcase>"#;
        assert!(matches!(
            ShowcaseConfig::from_xml(xml),
            Err(ConfigError::Parameter(_))
        ));
    }
}
