use std::collections::BTreeSet;
use std::f32::consts::FRAC_PI_6;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use log::{debug, info};
use thiserror::Error;

use crate::fragment::{Geometry, MaterialBinding, SceneFragment, Transform};
use crate::material::{
    srgb_hex_to_linear, Material, MaterialId, MaterialRegistry, TextureImage, TextureStore,
};
use crate::panel::ParameterSink;
use crate::params::{ParamKey, ParamValue, ParameterError};
use crate::policy::{MaterialPolicy, ProductPart, Role};

/// Environment intensity given to every lit material once the product is in.
pub const ENV_MAP_INTENSITY: f32 = 2.5;

#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    #[error("asset does not have the expected parts (missing: {missing:?}, duplicated: {duplicated:?})")]
    PreconditionViolation {
        missing: Vec<Role>,
        duplicated: Vec<Role>,
    },
    #[error("a product is already attached to the scene")]
    AlreadyAttached,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Light shining from `position` towards the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

impl DirectionalLight {
    /// Unit vector pointing from the lit surface towards the light.
    pub fn direction(&self) -> Vec3 {
        self.position.normalize_or_zero()
    }
}

/// The composed product: all parts under one transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductGroup {
    pub transform: Transform,
    pub parts: Vec<ProductPart>,
}

impl ProductGroup {
    fn new(parts: Vec<ProductPart>) -> Self {
        Self {
            transform: Transform {
                translation: Vec3::new(0.0, 0.7, 0.0),
                rotation: Quat::from_rotation_y(FRAC_PI_6),
                scale: Vec3::splat(0.5),
            },
            parts,
        }
    }

    pub fn part(&self, role: Role) -> Option<&ProductPart> {
        self.parts.iter().find(|part| part.role == role)
    }
}

/// One mesh to draw this frame.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub role: Role,
    pub geometry: Arc<Geometry>,
    pub world: Mat4,
    pub material: MaterialId,
}

/// Lights, shared materials and the product, once it has been loaded.
#[derive(Debug)]
pub struct Scene {
    pub ambient: AmbientLight,
    pub directional: [DirectionalLight; 2],
    materials: MaterialRegistry,
    textures: TextureStore,
    policy: MaterialPolicy,
    product: Option<ProductGroup>,
    attachments: usize,
    material_passes: usize,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(MaterialPolicy::default())
    }
}

impl Scene {
    pub fn new(policy: MaterialPolicy) -> Self {
        let mut materials = MaterialRegistry::new();
        policy.install(&mut materials);
        let white = Vec3::ONE;
        Self {
            ambient: AmbientLight {
                color: white,
                intensity: 1.0,
            },
            directional: [
                DirectionalLight {
                    color: white,
                    intensity: 1.0,
                    position: Vec3::new(-2.0, 2.0, 0.0),
                },
                DirectionalLight {
                    color: white,
                    intensity: 1.0,
                    position: Vec3::new(2.0, 2.0, 0.0),
                },
            ],
            materials,
            textures: TextureStore::default(),
            policy,
            product: None,
            attachments: 0,
            material_passes: 0,
        }
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }

    pub fn product(&self) -> Option<&ProductGroup> {
        self.product.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.product.is_some()
    }

    /// How many times a product has been attached. Never exceeds one.
    pub fn attachment_count(&self) -> usize {
        self.attachments
    }

    /// How many [`Scene::update_all_materials`] passes have run.
    pub fn material_pass_count(&self) -> usize {
        self.material_passes
    }

    /// Runs the material policy over `fragment` and adds the result to the
    /// scene. Succeeds at most once per scene.
    pub fn attach_product(&mut self, fragment: SceneFragment) -> Result<&ProductGroup, SceneError> {
        if self.product.is_some() {
            return Err(SceneError::AlreadyAttached);
        }

        let bound = self.policy.apply(fragment, &mut self.materials)?;
        let imported: Vec<MaterialId> = bound
            .imported_materials
            .into_iter()
            .map(|material| self.materials.insert(material))
            .collect();

        let mut parts = bound.parts;
        let mut fallback = None;
        for part in &mut parts {
            let materials = &mut self.materials;
            part.node.for_each_mesh_mut(&mut |mesh| {
                let id = match mesh.material {
                    MaterialBinding::Shared(id) => id,
                    MaterialBinding::Imported(index) if index < imported.len() => imported[index],
                    MaterialBinding::Imported(_) | MaterialBinding::Unassigned => {
                        *fallback.get_or_insert_with(|| materials.fallback())
                    }
                };
                mesh.material = MaterialBinding::Shared(id);
            });
        }

        info!(
            "attached product with {} part(s), {} imported material(s)",
            parts.len(),
            imported.len()
        );
        self.product = Some(ProductGroup::new(parts));
        self.attachments += 1;
        self.update_all_materials();

        self.product.as_ref().ok_or(SceneError::AlreadyAttached)
    }

    /// Gives every lit material the environment intensity and lets every
    /// mesh using one cast and receive shadows. Each distinct material is
    /// marked dirty once, however many meshes share it. Returns the number
    /// of materials touched.
    pub fn update_all_materials(&mut self) -> usize {
        let Some(product) = self.product.as_mut() else {
            return 0;
        };

        let materials = &self.materials;
        let mut touched = BTreeSet::new();
        for part in &mut product.parts {
            part.node.for_each_mesh_mut(&mut |mesh| {
                let MaterialBinding::Shared(id) = mesh.material else {
                    return;
                };
                let lit = materials
                    .get(id)
                    .is_some_and(|material| material.kind.is_standard());
                if lit {
                    mesh.cast_shadow = true;
                    mesh.receive_shadow = true;
                    touched.insert(id);
                }
            });
        }

        for id in &touched {
            self.materials
                .update(*id, |material| material.env_map_intensity = ENV_MAP_INTENSITY);
        }
        self.material_passes += 1;
        debug!("material pass updated {} material(s)", touched.len());
        touched.len()
    }

    /// Installs the floor's shadow and alpha textures. Either may be absent
    /// when it failed to load.
    pub fn set_floor_textures(&mut self, shadow: Option<TextureImage>, alpha: Option<TextureImage>) {
        let Some(floor) = self.materials.role(Role::Floor) else {
            return;
        };
        let map = shadow.map(|image| self.textures.insert(image));
        let alpha_map = alpha.map(|image| self.textures.insert(image));
        if map.is_none() && alpha_map.is_none() {
            return;
        }
        self.materials.update(floor, |material| {
            if map.is_some() {
                material.map = map;
            }
            if alpha_map.is_some() {
                material.alpha_map = alpha_map;
            }
        });
    }

    /// Every mesh of the product with its world matrix, in composition order.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut items = Vec::new();
        let Some(product) = self.product.as_ref() else {
            return items;
        };
        let root = product.transform.matrix();
        for part in &product.parts {
            part.node.for_each_mesh(root, &mut |mesh, world| {
                if let MaterialBinding::Shared(material) = mesh.material {
                    items.push(DrawItem {
                        role: part.role,
                        geometry: Arc::clone(&mesh.geometry),
                        world,
                        material,
                    });
                }
            });
        }
        items
    }

    fn update_role(&mut self, role: Role, update: impl FnOnce(&mut Material)) {
        match self.materials.role(role) {
            Some(id) => {
                self.materials.update(id, update);
            }
            None => debug!("no {role} material to update"),
        }
    }
}

impl ParameterSink for Scene {
    /// Applies lighting and part colour changes immediately.
    fn set_live_parameter(&mut self, key: ParamKey, value: ParamValue) -> Result<(), ParameterError> {
        let value = value.checked_for(key)?;
        let color = value.as_color().map(srgb_hex_to_linear);
        let scalar = value.as_scalar();

        match (key, color, scalar) {
            (ParamKey::FloorColor, Some(color), _) => {
                self.update_role(Role::Floor, |material| material.color = color)
            }
            (ParamKey::FrameColor, Some(color), _) => {
                self.update_role(Role::Frame, |material| material.color = color)
            }
            (ParamKey::LightsEmissionColor, Some(color), _) => self.update_role(Role::Lights, |material| {
                material.color = color;
                material.emissive = color;
            }),
            (ParamKey::LightsEmissionIntensity, _, Some(intensity)) => self
                .update_role(Role::Lights, |material| material.emissive_intensity = intensity),
            (ParamKey::AmbientIntensity, _, Some(intensity)) => self.ambient.intensity = intensity,
            (ParamKey::Directional1Color, Some(color), _) => self.directional[0].color = color,
            (ParamKey::Directional1Intensity, _, Some(intensity)) => {
                self.directional[0].intensity = intensity
            }
            (ParamKey::Directional2Color, Some(color), _) => self.directional[1].color = color,
            (ParamKey::Directional2Intensity, _, Some(intensity)) => {
                self.directional[1].intensity = intensity
            }
            _ => return Err(ParameterError::WrongTarget(key)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{MeshNode, Node};
    use crate::material::{linear_to_srgb_hex, MaterialKind};

    fn part(name: &str, meshes: usize, binding: MaterialBinding) -> Node {
        let mut node = Node::group(name);
        for _ in 0..meshes {
            node.meshes.push(MeshNode::new(Geometry::default(), binding));
        }
        node
    }

    fn fragment() -> SceneFragment {
        SceneFragment {
            groups: vec![
                part("Backgrounds", 1, MaterialBinding::Imported(1)),
                part("Lights", 3, MaterialBinding::Imported(0)),
                part("Objects", 2, MaterialBinding::Imported(0)),
                part("Windows", 2, MaterialBinding::Unassigned),
                part("Frame", 4, MaterialBinding::Unassigned),
                part("Floor", 1, MaterialBinding::Unassigned),
            ],
            materials: vec![Material::standard("paint"), Material::basic("backdrop")],
        }
    }

    #[test]
    fn attaches_exactly_once() {
        let mut scene = Scene::default();
        scene.attach_product(fragment()).unwrap();
        assert_eq!(scene.attach_product(fragment()), Err(SceneError::AlreadyAttached));
        assert_eq!(scene.attachment_count(), 1);
        assert_eq!(scene.material_pass_count(), 1);
    }

    #[test]
    fn product_group_is_placed_and_ordered() {
        let mut scene = Scene::default();
        let product = scene.attach_product(fragment()).unwrap();
        let roles: Vec<Role> = product.parts.iter().map(|part| part.role).collect();
        assert_eq!(roles, Role::COMPOSITION_ORDER.to_vec());
        assert_eq!(product.transform.translation, Vec3::new(0.0, 0.7, 0.0));
        assert_eq!(product.transform.scale, Vec3::splat(0.5));
        let (axis, angle) = product.transform.rotation.to_axis_angle();
        assert!((axis - Vec3::Y).length() < 1e-5);
        assert!((angle - FRAC_PI_6).abs() < 1e-5);
    }

    #[test]
    fn material_pass_touches_each_lit_material_once() {
        let mut scene = Scene::default();
        let frame = scene.materials().role(Role::Frame).unwrap();
        assert_eq!(scene.materials().revision(frame), Some(0));
        scene.attach_product(fragment()).unwrap();

        // Frame has four meshes sharing one material.
        assert_eq!(scene.materials().revision(frame), Some(1));
        for item in scene.draw_list() {
            let material = scene.materials().get(item.material).unwrap();
            if material.kind.is_standard() {
                assert_eq!(material.env_map_intensity, ENV_MAP_INTENSITY);
            } else {
                assert_eq!(material.kind, MaterialKind::Basic);
                assert_eq!(material.env_map_intensity, 1.0);
            }
        }
    }

    #[test]
    fn lit_meshes_cast_and_receive_shadows() {
        let mut scene = Scene::default();
        scene.attach_product(fragment()).unwrap();
        let product = scene.product().unwrap();
        let mut frame = product.part(Role::Frame).unwrap().node.clone();
        frame.for_each_mesh_mut(&mut |mesh| assert!(mesh.cast_shadow && mesh.receive_shadow));
        let mut backdrop = product.part(Role::Background).unwrap().node.clone();
        backdrop.for_each_mesh_mut(&mut |mesh| assert!(!mesh.cast_shadow));
    }

    #[test]
    fn unassigned_meshes_use_the_fallback() {
        let mut groups = fragment();
        groups.groups[2] = part("Objects", 1, MaterialBinding::Unassigned);
        let mut scene = Scene::default();
        scene.attach_product(groups).unwrap();
        let objects: Vec<_> = scene
            .draw_list()
            .into_iter()
            .filter(|item| item.role == Role::Objects)
            .collect();
        assert_eq!(objects.len(), 1);
        assert_eq!(
            scene.materials().get(objects[0].material).unwrap().name,
            "default"
        );
    }

    #[test]
    fn missing_part_leaves_the_scene_empty() {
        let mut broken = fragment();
        broken.groups.remove(4);
        let mut scene = Scene::default();
        assert!(matches!(
            scene.attach_product(broken),
            Err(SceneError::PreconditionViolation { .. })
        ));
        assert!(!scene.is_attached());
        assert!(scene.draw_list().is_empty());
        scene.attach_product(fragment()).unwrap();
    }

    #[test]
    fn live_parameters_reach_shared_materials_and_lights() {
        let mut scene = Scene::default();
        scene.attach_product(fragment()).unwrap();
        let frame = scene.materials().role(Role::Frame).unwrap();
        let before = scene.materials().revision(frame).unwrap();

        scene
            .set_live_parameter(ParamKey::FrameColor, ParamValue::Color(0xff0000))
            .unwrap();
        assert_eq!(scene.materials().revision(frame), Some(before + 1));
        let color = scene.materials().get(frame).unwrap().color;
        assert_eq!(linear_to_srgb_hex(color), 0xff0000);
        for item in scene.draw_list().iter().filter(|i| i.role == Role::Frame) {
            assert_eq!(item.material, frame);
        }

        scene
            .set_live_parameter(ParamKey::Directional2Intensity, ParamValue::Scalar(3.5))
            .unwrap();
        assert_eq!(scene.directional[1].intensity, 3.5);
        assert_eq!(scene.directional[0].intensity, 1.0);

        scene
            .set_live_parameter(ParamKey::LightsEmissionIntensity, ParamValue::Scalar(2.0))
            .unwrap();
        let lights = scene.materials().role(Role::Lights).unwrap();
        assert_eq!(scene.materials().get(lights).unwrap().emissive_intensity, 2.0);
    }

    #[test]
    fn pipeline_keys_are_not_scene_parameters() {
        let mut scene = Scene::default();
        assert_eq!(
            scene.set_live_parameter(ParamKey::Exposure, ParamValue::Scalar(1.0)),
            Err(ParameterError::WrongTarget(ParamKey::Exposure))
        );
        assert!(scene
            .set_live_parameter(ParamKey::FloorColor, ParamValue::Scalar(1.0))
            .is_err());
    }

    #[test]
    fn floor_textures_land_on_the_floor_material() {
        let mut scene = Scene::default();
        let image = TextureImage {
            label: "shadow".to_string(),
            width: 1,
            height: 1,
            rgba: Arc::from(vec![0u8, 0, 0, 255]),
        };
        scene.set_floor_textures(Some(image), None);
        let floor = scene.materials().role(Role::Floor).unwrap();
        let material = scene.materials().get(floor).unwrap();
        assert!(material.map.is_some());
        assert!(material.alpha_map.is_none());
        assert!(material.is_blended());
        assert_eq!(scene.textures().len(), 1);
    }

    #[test]
    fn draw_list_applies_the_product_transform() {
        let mut scene = Scene::default();
        scene.attach_product(fragment()).unwrap();
        let floor = scene
            .draw_list()
            .into_iter()
            .find(|item| item.role == Role::Floor)
            .unwrap();
        let origin = floor.world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(0.0, 0.7, 0.0)).length() < 1e-6);
    }
}
