use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::policy::Role;

/// Shading model of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    /// Unlit, ignores lights and environment.
    Basic,
    Standard,
    /// Standard plus clearcoat, reflectivity and index of refraction.
    Physical,
}

impl MaterialKind {
    /// Whether the material takes part in physically based lighting.
    pub fn is_standard(self) -> bool {
        matches!(self, Self::Standard | Self::Physical)
    }
}

/// Handle of a texture stored in a [`TextureStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(usize);

impl TextureId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle of a material stored in a [`MaterialRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(usize);

impl MaterialId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Surface description shared by every mesh bound to it.
///
/// Colors are stored in linear space.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub color: Vec3,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub opacity: f32,
    pub transparent: bool,
    pub env_map_intensity: f32,
    pub clearcoat: f32,
    pub reflectivity: f32,
    pub ior: f32,
    pub map: Option<TextureId>,
    pub alpha_map: Option<TextureId>,
}

impl Material {
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MaterialKind::Standard,
            color: Vec3::ONE,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            metalness: 0.0,
            roughness: 1.0,
            opacity: 1.0,
            transparent: false,
            env_map_intensity: 1.0,
            clearcoat: 0.0,
            reflectivity: 0.5,
            ior: 1.5,
            map: None,
            alpha_map: None,
        }
    }

    pub fn physical(name: impl Into<String>) -> Self {
        Self {
            kind: MaterialKind::Physical,
            ..Self::standard(name)
        }
    }

    pub fn basic(name: impl Into<String>) -> Self {
        Self {
            kind: MaterialKind::Basic,
            ..Self::standard(name)
        }
    }

    pub fn with_color(mut self, hex: u32) -> Self {
        self.color = srgb_hex_to_linear(hex);
        self
    }

    pub fn with_emissive(mut self, hex: u32, intensity: f32) -> Self {
        self.emissive = srgb_hex_to_linear(hex);
        self.emissive_intensity = intensity;
        self
    }

    pub fn with_surface(mut self, metalness: f32, roughness: f32) -> Self {
        self.metalness = metalness;
        self.roughness = roughness;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.transparent = true;
        self.opacity = opacity;
        self
    }

    /// Whether the renderer has to blend this material over opaque geometry.
    pub fn is_blended(&self) -> bool {
        self.transparent && (self.opacity < 1.0 || self.alpha_map.is_some() || self.map.is_some())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    material: Material,
    revision: u64,
}

/// Arena of shared materials.
///
/// Meshes refer to materials through [`MaterialId`], so a mutation made
/// through [`MaterialRegistry::update`] reaches every mesh holding that id.
/// Each update bumps the material's revision once; renderers compare
/// revisions to know when cached GPU state is stale.
#[derive(Debug, Default)]
pub struct MaterialRegistry {
    entries: Vec<Entry>,
    roles: HashMap<Role, MaterialId>,
    fallback: Option<MaterialId>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.entries.len());
        self.entries.push(Entry {
            material,
            revision: 0,
        });
        id
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.entries.get(id.0).map(|entry| &entry.material)
    }

    /// Returns how many times the material has been mutated since insertion.
    pub fn revision(&self, id: MaterialId) -> Option<u64> {
        self.entries.get(id.0).map(|entry| entry.revision)
    }

    /// Applies a mutation and marks the material dirty exactly once.
    pub fn update<F, R>(&mut self, id: MaterialId, updater: F) -> Option<R>
    where
        F: FnOnce(&mut Material) -> R,
    {
        let entry = self.entries.get_mut(id.0)?;
        let result = updater(&mut entry.material);
        entry.revision += 1;
        Some(result)
    }

    /// Binds `material` to `role`, keeping the existing instance when the
    /// role is already bound so repeated bindings resolve to the same id.
    pub fn bind_role(&mut self, role: Role, material: Material) -> MaterialId {
        if let Some(id) = self.roles.get(&role) {
            return *id;
        }
        let id = self.insert(material);
        self.roles.insert(role, id);
        id
    }

    pub fn role(&self, role: Role) -> Option<MaterialId> {
        self.roles.get(&role).copied()
    }

    /// Material used by meshes that arrive without one.
    pub fn fallback(&mut self) -> MaterialId {
        if let Some(id) = self.fallback {
            return id;
        }
        let id = self.insert(Material::standard("default"));
        self.fallback = Some(id);
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (MaterialId(index), &entry.material))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decoded RGBA8 raster used as a material input.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<[u8]>,
}

/// Read-only textures, loaded once per session.
#[derive(Debug, Default)]
pub struct TextureStore {
    images: Vec<TextureImage>,
}

impl TextureStore {
    pub fn insert(&mut self, image: TextureImage) -> TextureId {
        self.images.push(image);
        TextureId(self.images.len() - 1)
    }

    pub fn get(&self, id: TextureId) -> Option<&TextureImage> {
        self.images.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Converts a `0xRRGGBB` sRGB color into linear components.
pub fn srgb_hex_to_linear(hex: u32) -> Vec3 {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    Vec3::new(channel(16), channel(8), channel(0))
}

/// Converts linear components back into a `0xRRGGBB` sRGB color.
pub fn linear_to_srgb_hex(color: Vec3) -> u32 {
    let channel = |value: f32| (linear_to_srgb(value.clamp(0.0, 1.0)) * 255.0).round() as u32;
    (channel(color.x) << 16) | (channel(color.y) << 8) | channel(color.z)
}

fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.0031308 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}
