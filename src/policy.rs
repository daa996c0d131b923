//! Binds shared materials to the named parts of the product asset.
//!
//! The showcase asset is a display case split into six logical parts. Each
//! part is found by node name (with configurable aliases) rather than by its
//! position in the file; a missing or ambiguous part is reported as a
//! [`SceneError::PreconditionViolation`] before anything is attached.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::fragment::{MaterialBinding, Node, SceneFragment};
use crate::material::{Material, MaterialRegistry};
use crate::scene::SceneError;

/// Logical part of the product asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Background,
    Lights,
    Windows,
    Objects,
    Frame,
    Floor,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Background,
        Role::Lights,
        Role::Windows,
        Role::Objects,
        Role::Frame,
        Role::Floor,
    ];

    /// Order in which the composed product group holds its parts.
    pub const COMPOSITION_ORDER: [Role; 6] = [
        Role::Frame,
        Role::Windows,
        Role::Background,
        Role::Lights,
        Role::Objects,
        Role::Floor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Background => "background",
            Role::Lights => "lights",
            Role::Windows => "windows",
            Role::Objects => "objects",
            Role::Frame => "frame",
            Role::Floor => "floor",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Node name used by the stock asset.
    pub fn default_node_name(self) -> &'static str {
        match self {
            Role::Background => "Backgrounds",
            Role::Lights => "Lights",
            Role::Windows => "Windows",
            Role::Objects => "Objects",
            Role::Frame => "Frame",
            Role::Floor => "Floor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the policy does to one part.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleBinding {
    /// Shared material for every mesh of the part; `None` keeps the
    /// materials that came with the asset.
    pub material: Option<Material>,
    /// Copy the frame's rotation onto this part.
    pub align_to_frame: bool,
}

/// A part of the product after the policy ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPart {
    pub role: Role,
    pub node: Node,
}

/// Output of [`MaterialPolicy::apply`]: parts in composition order and the
/// asset materials still referenced by [`MaterialBinding::Imported`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoundProduct {
    pub parts: Vec<ProductPart>,
    pub imported_materials: Vec<Material>,
    /// Names of top-level groups that matched no role.
    pub dropped: Vec<String>,
}

impl BoundProduct {
    pub fn part(&self, role: Role) -> Option<&ProductPart> {
        self.parts.iter().find(|part| part.role == role)
    }
}

/// Static role → material table plus the node names that identify each role.
#[derive(Debug, Clone)]
pub struct MaterialPolicy {
    aliases: BTreeMap<Role, Vec<String>>,
}

impl Default for MaterialPolicy {
    fn default() -> Self {
        let aliases = Role::ALL
            .into_iter()
            .map(|role| (role, vec![role.default_node_name().to_string()]))
            .collect();
        Self { aliases }
    }
}

impl MaterialPolicy {
    /// Creates a policy with extra node names per role on top of the defaults.
    pub fn with_aliases(extra: &BTreeMap<Role, Vec<String>>) -> Self {
        let mut policy = Self::default();
        for (role, names) in extra {
            let entry = policy.aliases.entry(*role).or_default();
            for name in names {
                if !entry.iter().any(|known| known.eq_ignore_ascii_case(name)) {
                    entry.push(name.clone());
                }
            }
        }
        policy
    }

    pub fn binding(&self, role: Role) -> RoleBinding {
        match role {
            Role::Frame => RoleBinding {
                material: Some(Material::standard("frame").with_color(0x121212)),
                align_to_frame: false,
            },
            Role::Windows => {
                let mut glass = Material::physical("windows")
                    .with_surface(0.9, 0.2)
                    .with_opacity(0.2);
                glass.env_map_intensity = 0.9;
                glass.clearcoat = 1.0;
                glass.reflectivity = 0.2;
                glass.ior = 1.0;
                RoleBinding {
                    material: Some(glass),
                    align_to_frame: true,
                }
            }
            Role::Lights => RoleBinding {
                material: Some(
                    // Emissive tracks the color so the emission controls have a base to scale.
                    Material::standard("lights")
                        .with_color(0xa8beff)
                        .with_emissive(0xa8beff, 1.0),
                ),
                align_to_frame: true,
            },
            Role::Background => RoleBinding {
                material: None,
                align_to_frame: true,
            },
            Role::Objects => RoleBinding {
                material: None,
                align_to_frame: false,
            },
            Role::Floor => {
                let mut floor = Material::standard("floor").with_color(0x555555);
                floor.transparent = true;
                RoleBinding {
                    material: Some(floor),
                    align_to_frame: false,
                }
            }
        }
    }

    /// Registers the shared role materials so live parameters can reach them
    /// before the asset arrives.
    pub fn install(&self, registry: &mut MaterialRegistry) {
        for role in Role::ALL {
            if let Some(material) = self.binding(role).material {
                registry.bind_role(role, material);
            }
        }
    }

    /// Finds which top-level group plays which role.
    pub fn resolve(&self, fragment: &SceneFragment) -> Result<BTreeMap<Role, usize>, SceneError> {
        let mut found: BTreeMap<Role, usize> = BTreeMap::new();
        let mut duplicated = Vec::new();

        for (index, group) in fragment.groups.iter().enumerate() {
            let Some(role) = self.role_of(&group.name) else {
                continue;
            };
            if found.insert(role, index).is_some() && !duplicated.contains(&role) {
                duplicated.push(role);
            }
        }

        let missing: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| !found.contains_key(role))
            .collect();
        if !missing.is_empty() || !duplicated.is_empty() {
            return Err(SceneError::PreconditionViolation {
                missing,
                duplicated,
            });
        }
        Ok(found)
    }

    /// Binds role materials and aligns dependent parts to the frame.
    pub fn apply(
        &self,
        fragment: SceneFragment,
        registry: &mut MaterialRegistry,
    ) -> Result<BoundProduct, SceneError> {
        let found = self.resolve(&fragment)?;
        let SceneFragment { groups, materials } = fragment;

        let mut slots: Vec<Option<Node>> = groups.into_iter().map(Some).collect();
        let mut take = |role: Role| {
            slots[found[&role]]
                .take()
                .ok_or(SceneError::PreconditionViolation {
                    missing: vec![role],
                    duplicated: Vec::new(),
                })
        };

        let frame = take(Role::Frame)?;
        let rotation = frame.transform.rotation;
        let mut parts = vec![ProductPart {
            role: Role::Frame,
            node: frame,
        }];
        for role in Role::COMPOSITION_ORDER.into_iter().skip(1) {
            parts.push(ProductPart {
                role,
                node: take(role)?,
            });
        }

        for part in &mut parts {
            let binding = self.binding(part.role);
            if let Some(material) = binding.material {
                let id = registry.bind_role(part.role, material);
                let mut bound = 0usize;
                part.node.for_each_mesh_mut(&mut |mesh| {
                    mesh.material = MaterialBinding::Shared(id);
                    bound += 1;
                });
                debug!("bound {bound} mesh(es) of {} to material {id:?}", part.role);
            }
            if binding.align_to_frame {
                part.node.transform.rotation = rotation;
            }
        }

        let dropped: Vec<String> = slots
            .into_iter()
            .flatten()
            .map(|node| node.name)
            .collect();
        for name in &dropped {
            debug!("group {name:?} matches no role and is left out of the product");
        }

        Ok(BoundProduct {
            parts,
            imported_materials: materials,
            dropped,
        })
    }

    fn role_of(&self, name: &str) -> Option<Role> {
        let name = name.trim();
        self.aliases.iter().find_map(|(role, names)| {
            names
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
                .then_some(*role)
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;
    use crate::fragment::{Geometry, MeshNode};

    fn part(name: &str, meshes: usize) -> Node {
        let mut node = Node::group(name);
        for _ in 0..meshes {
            node.meshes.push(MeshNode::new(
                Geometry::default(),
                MaterialBinding::Imported(0),
            ));
        }
        node
    }

    fn stock_fragment() -> SceneFragment {
        let mut frame = part("Frame", 2);
        frame.transform.rotation = Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
        let mut windows = part("Windows", 1);
        windows.children.push(part("Pane", 3));
        SceneFragment {
            groups: vec![
                part("Backgrounds", 1),
                part("Lights", 2),
                part("Helpers", 1),
                part("Objects", 4),
                windows,
                frame,
                part("Floor", 1),
            ],
            materials: vec![Material::standard("imported")],
        }
    }

    #[test]
    fn every_role_mesh_gets_the_shared_material() {
        let policy = MaterialPolicy::default();
        let mut registry = MaterialRegistry::new();
        let bound = policy.apply(stock_fragment(), &mut registry).unwrap();

        for role in [Role::Frame, Role::Windows, Role::Lights, Role::Floor] {
            let expected = registry.role(role).unwrap();
            let mut node = bound.part(role).unwrap().node.clone();
            let mut count = 0;
            node.for_each_mesh_mut(&mut |mesh| {
                assert_eq!(mesh.material, MaterialBinding::Shared(expected));
                count += 1;
            });
            assert!(count > 0);
        }

        let mut objects = bound.part(Role::Objects).unwrap().node.clone();
        objects.for_each_mesh_mut(&mut |mesh| {
            assert_eq!(mesh.material, MaterialBinding::Imported(0));
        });
        assert!(registry.role(Role::Background).is_none());
    }

    #[test]
    fn dependent_parts_follow_the_frame_rotation() {
        let bound = MaterialPolicy::default()
            .apply(stock_fragment(), &mut MaterialRegistry::new())
            .unwrap();
        let frame = bound.part(Role::Frame).unwrap().node.transform.rotation;
        for role in [Role::Windows, Role::Background, Role::Lights] {
            let rotation = bound.part(role).unwrap().node.transform.rotation;
            assert!(rotation.angle_between(frame) < 1e-5, "{role} not aligned");
        }
        let floor = bound.part(Role::Floor).unwrap().node.transform.rotation;
        assert!(floor.angle_between(Quat::IDENTITY) < 1e-6);
    }

    #[test]
    fn parts_are_composed_in_fixed_order() {
        let bound = MaterialPolicy::default()
            .apply(stock_fragment(), &mut MaterialRegistry::new())
            .unwrap();
        let roles: Vec<Role> = bound.parts.iter().map(|part| part.role).collect();
        assert_eq!(roles, Role::COMPOSITION_ORDER.to_vec());
        assert_eq!(bound.dropped, vec!["Helpers".to_string()]);
    }

    #[test]
    fn reapplying_reuses_the_same_materials() {
        let policy = MaterialPolicy::default();
        let mut registry = MaterialRegistry::new();
        policy.install(&mut registry);
        let installed = registry.len();
        let first = policy.apply(stock_fragment(), &mut registry).unwrap();
        let second = policy.apply(stock_fragment(), &mut registry).unwrap();
        assert_eq!(registry.len(), installed);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_part_is_a_precondition_violation() {
        let mut fragment = stock_fragment();
        fragment.groups.retain(|group| group.name != "Floor");
        let err = MaterialPolicy::default()
            .apply(fragment, &mut MaterialRegistry::new())
            .unwrap_err();
        match err {
            SceneError::PreconditionViolation {
                missing,
                duplicated,
            } => {
                assert_eq!(missing, vec![Role::Floor]);
                assert!(duplicated.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn duplicated_part_is_a_precondition_violation() {
        let mut fragment = stock_fragment();
        fragment.groups.push(part("frame", 1));
        let err = MaterialPolicy::default()
            .resolve(&fragment)
            .unwrap_err();
        assert!(matches!(
            err,
            SceneError::PreconditionViolation { ref duplicated, .. } if duplicated == &vec![Role::Frame]
        ));
    }

    #[test]
    fn aliases_extend_the_stock_names() {
        let mut fragment = stock_fragment();
        fragment.groups[0].name = "Backdrop".to_string();
        let mut extra = BTreeMap::new();
        extra.insert(Role::Background, vec!["backdrop".to_string()]);
        let policy = MaterialPolicy::with_aliases(&extra);
        let found = policy.resolve(&fragment).unwrap();
        assert_eq!(found[&Role::Background], 0);
        assert_eq!(found[&Role::Frame], 5);
    }

    #[test]
    fn lights_glow_in_their_own_color() {
        let lights = MaterialPolicy::default()
            .binding(Role::Lights)
            .material
            .unwrap();
        assert_eq!(lights.emissive, lights.color);
        assert_ne!(lights.emissive, Vec3::ZERO);
        assert_eq!(lights.emissive_intensity, 1.0);
    }

    #[test]
    fn role_names_parse_case_insensitively() {
        assert_eq!(Role::from_name("Frame"), Some(Role::Frame));
        assert_eq!(Role::from_name(" floor "), Some(Role::Floor));
        assert_eq!(Role::from_name("roof"), None);
    }
}
