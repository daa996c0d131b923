//! Fetches the product asset and its textures and turns them into scene
//! fragments.
//!
//! Fetching goes through [`AssetSource`]: a directory on disk for the
//! native host, `fetch()` for the browser, and an in-memory map for tests.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use glam::{Quat, Vec3};
use log::{debug, info};
use thiserror::Error;

use crate::fragment::{Geometry, MaterialBinding, MeshNode, Node, SceneFragment, Transform};
use crate::material::{Material, TextureImage};
use crate::obj::load_obj_from_str;

#[derive(Debug, Error)]
pub enum AssetLoadError {
    #[error("failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("unsupported asset format: {path}")]
    Unsupported { path: String },
    #[error("asset {path} contains no geometry")]
    Empty { path: String },
}

impl AssetLoadError {
    fn decode(path: &str, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Where asset bytes come from.
pub trait AssetSource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, AssetLoadError>>;
}

/// Reads assets relative to a root directory.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetSource for DirectorySource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, AssetLoadError>> {
        let full = self.root.join(path);
        let result = std::fs::read(&full).map_err(|err| AssetLoadError::Fetch {
            path: full.display().to_string(),
            reason: err.to_string(),
        });
        std::future::ready(result)
    }
}

/// Assets held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn with(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl AssetSource for MemorySource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, AssetLoadError>> {
        let result = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| AssetLoadError::Fetch {
                path: path.to_string(),
                reason: "not found".to_string(),
            });
        std::future::ready(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetFormat {
    Gltf,
    Obj,
}

impl AssetFormat {
    fn from_path(path: &str) -> Option<Self> {
        let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "glb" | "gltf" => Some(Self::Gltf),
            "obj" => Some(Self::Obj),
            _ => None,
        }
    }
}

/// Loads product assets and textures from a source.
#[derive(Debug, Clone)]
pub struct AssetLoader<S> {
    source: S,
}

impl<S: AssetSource> AssetLoader<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches and decodes a model. No retry, no fallback asset.
    pub async fn load(&self, path: &str) -> Result<SceneFragment, AssetLoadError> {
        let format = AssetFormat::from_path(path).ok_or_else(|| AssetLoadError::Unsupported {
            path: path.to_string(),
        })?;
        let bytes = self.source.fetch(path).await?;
        let fragment = decode_fragment(path, format, &bytes)?;
        info!(
            "loaded {path}: {} groups, {} meshes, {} materials",
            fragment.groups.len(),
            fragment.mesh_count(),
            fragment.materials.len()
        );
        Ok(fragment)
    }

    /// Fetches a PNG or JPEG and converts it to RGBA8.
    pub async fn load_texture(&self, path: &str) -> Result<TextureImage, AssetLoadError> {
        let bytes = self.source.fetch(path).await?;
        decode_texture(path, &bytes)
    }
}

fn decode_fragment(
    path: &str,
    format: AssetFormat,
    bytes: &[u8],
) -> Result<SceneFragment, AssetLoadError> {
    if bytes.is_empty() {
        return Err(AssetLoadError::Empty {
            path: path.to_string(),
        });
    }
    let fragment = match format {
        AssetFormat::Gltf => {
            decode_gltf(bytes).map_err(|err| AssetLoadError::decode(path, format!("{err:#}")))?
        }
        AssetFormat::Obj => {
            let text = std::str::from_utf8(bytes).map_err(|err| AssetLoadError::decode(path, err))?;
            load_obj_from_str(text).map_err(|err| AssetLoadError::decode(path, format!("{err:#}")))?
        }
    };
    if fragment.mesh_count() == 0 {
        return Err(AssetLoadError::Empty {
            path: path.to_string(),
        });
    }
    Ok(fragment)
}

fn decode_texture(path: &str, bytes: &[u8]) -> Result<TextureImage, AssetLoadError> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| AssetLoadError::decode(path, err))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    debug!("decoded texture {path} ({width}x{height})");
    Ok(TextureImage {
        label: path.to_string(),
        width,
        height,
        rgba: Arc::from(image.into_raw()),
    })
}

/// Top-level nodes of the default scene become the fragment's groups.
fn decode_gltf(bytes: &[u8]) -> Result<SceneFragment> {
    let (document, buffers, _images) = gltf::import_slice(bytes)?;

    let materials = document.materials().map(convert_material).collect();
    let groups = match document
        .default_scene()
        .or_else(|| document.scenes().next())
    {
        Some(scene) => scene
            .nodes()
            .map(|node| convert_node(&node, &buffers))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(SceneFragment { groups, materials })
}

fn convert_node(node: &gltf::Node<'_>, buffers: &[gltf::buffer::Data]) -> Result<Node> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let mut converted = Node::group(node.name().unwrap_or_default());
    converted.transform = Transform {
        translation: Vec3::from_array(translation),
        rotation: Quat::from_array(rotation),
        scale: Vec3::from_array(scale),
    };

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                debug!("skipping non-triangle primitive in {}", converted.name);
                continue;
            }
            let Some(geometry) = read_primitive(&primitive, buffers)? else {
                continue;
            };
            let material = primitive
                .material()
                .index()
                .map_or(MaterialBinding::Unassigned, MaterialBinding::Imported);
            converted.meshes.push(MeshNode::new(geometry, material));
        }
    }

    converted.children = node
        .children()
        .map(|child| convert_node(&child, buffers))
        .collect::<Result<_>>()?;
    Ok(converted)
}

fn read_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<Option<Geometry>> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
    let Some(positions) = reader.read_positions() else {
        return Ok(None);
    };
    let positions: Vec<[f32; 3]> = positions.collect();
    let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
    let uvs: Option<Vec<[f32; 2]>> = reader
        .read_tex_coords(0)
        .map(|coords| coords.into_f32().collect());

    let mut geometry = Geometry::default();
    for (i, position) in positions.iter().enumerate() {
        let normal = normals
            .as_ref()
            .and_then(|normals| normals.get(i).copied())
            .unwrap_or([0.0; 3]);
        let uv = uvs
            .as_ref()
            .and_then(|uvs| uvs.get(i).copied())
            .unwrap_or([0.0; 2]);
        geometry.vertices.extend_from_slice(position);
        geometry.vertices.extend_from_slice(&normal);
        geometry.vertices.extend_from_slice(&uv);
    }
    geometry.indices = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    if let Some(index) = geometry
        .indices
        .iter()
        .find(|&&index| index as usize >= positions.len())
    {
        bail!(
            "primitive index {index} is out of range for {} vertices",
            positions.len()
        );
    }
    if geometry.needs_normals() {
        geometry.compute_normals();
    }
    Ok(Some(geometry))
}

fn convert_material(material: gltf::Material<'_>) -> Material {
    let name = material.name().unwrap_or("imported").to_string();
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();

    let mut converted = if material.unlit() {
        Material::basic(name)
    } else {
        Material::standard(name)
    };
    converted.color = Vec3::new(r, g, b);
    converted.emissive = Vec3::from_array(material.emissive_factor());
    converted.metalness = pbr.metallic_factor();
    converted.roughness = pbr.roughness_factor();
    if material.alpha_mode() == gltf::material::AlphaMode::Blend {
        converted.transparent = true;
        converted.opacity = a;
    }
    converted
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const TRIANGLE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\no Frame\nf 1 2 3\n";

    const TRIANGLE_GLTF: &str = r#"{
  "asset": {"version": "2.0"},
  "scene": 0,
  "scenes": [{"nodes": [0, 1]}],
  "nodes": [
    {"name": "Frame", "mesh": 0, "translation": [0, 1, 0]},
    {"name": "Objects", "children": [2]},
    {"name": "Vase", "mesh": 0}
  ],
  "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "indices": 1, "material": 0}]}],
  "materials": [{
    "name": "Glaze",
    "pbrMetallicRoughness": {"baseColorFactor": [1, 0, 0, 0.5], "metallicFactor": 0.25, "roughnessFactor": 0.75},
    "alphaMode": "BLEND"
  }],
  "buffers": [{"byteLength": 44, "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA="}],
  "bufferViews": [
    {"buffer": 0, "byteOffset": 0, "byteLength": 36},
    {"buffer": 0, "byteOffset": 36, "byteLength": 6}
  ],
  "accessors": [
    {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0]},
    {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}
  ]
}"#;

    fn png_bytes() -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn loads_obj_from_memory() {
        let loader = AssetLoader::new(MemorySource::new().with("models/cube.obj", TRIANGLE_OBJ));
        let fragment = pollster::block_on(loader.load("models/cube.obj")).unwrap();
        assert_eq!(fragment.groups.len(), 1);
        assert_eq!(fragment.groups[0].name, "Frame");
    }

    #[test]
    fn loads_embedded_gltf() {
        let loader = AssetLoader::new(MemorySource::new().with("cube.gltf", TRIANGLE_GLTF));
        let fragment = pollster::block_on(loader.load("cube.gltf")).unwrap();

        let names: Vec<_> = fragment.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Frame", "Objects"]);
        assert_eq!(fragment.groups[0].transform.translation, Vec3::Y);
        assert_eq!(fragment.groups[1].children[0].name, "Vase");
        assert_eq!(fragment.mesh_count(), 2);

        let mesh = &fragment.groups[0].meshes[0];
        assert_eq!(mesh.material, MaterialBinding::Imported(0));
        assert_eq!(mesh.geometry.indices, vec![0, 1, 2]);
        assert!(!mesh.geometry.needs_normals());

        let glaze = &fragment.materials[0];
        assert_eq!(glaze.name, "Glaze");
        assert_eq!(glaze.color, Vec3::X);
        assert!(glaze.transparent);
        assert_eq!(glaze.opacity, 0.5);
        assert_eq!(glaze.metalness, 0.25);
    }

    #[test]
    fn out_of_range_indices_are_a_decode_error() {
        // Same triangle with its last index pointing past the three vertices.
        let gltf = TRIANGLE_GLTF.replace("AAABAAIAAAA=", "AAABAAkAAAA=");
        let loader = AssetLoader::new(MemorySource::new().with("cube.gltf", gltf));
        let err = pollster::block_on(loader.load("cube.gltf")).unwrap_err();
        match err {
            AssetLoadError::Decode { reason, .. } => assert!(reason.contains("index 9"), "{reason}"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn reports_each_failure_kind() {
        let loader = AssetLoader::new(
            MemorySource::new()
                .with("empty.glb", Vec::new())
                .with("broken.glb", b"not a gltf".to_vec())
                .with("points.obj", "v 0 0 0\n"),
        );
        let load = |path: &str| pollster::block_on(loader.load(path)).unwrap_err();

        assert!(matches!(load("missing.glb"), AssetLoadError::Fetch { .. }));
        assert!(matches!(load("model.fbx"), AssetLoadError::Unsupported { .. }));
        assert!(matches!(load("empty.glb"), AssetLoadError::Empty { .. }));
        assert!(matches!(load("broken.glb"), AssetLoadError::Decode { .. }));
        assert!(matches!(load("points.obj"), AssetLoadError::Empty { .. }));
    }

    #[test]
    fn decodes_textures_to_rgba() {
        let loader = AssetLoader::new(MemorySource::new().with("textures/shadow.png", png_bytes()));
        let texture = pollster::block_on(loader.load_texture("textures/shadow.png")).unwrap();
        assert_eq!((texture.width, texture.height), (2, 3));
        assert_eq!(texture.rgba.len(), 2 * 3 * 4);
        assert_eq!(&texture.rgba[..4], &[10, 20, 30, 255]);

        let err = pollster::block_on(loader.load_texture("textures/missing.jpg")).unwrap_err();
        assert!(matches!(err, AssetLoadError::Fetch { .. }));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn directory_source_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("models")).unwrap();
        std::fs::write(dir.path().join("models/cube.obj"), TRIANGLE_OBJ).unwrap();

        let loader = AssetLoader::new(DirectorySource::new(dir.path()));
        let fragment = pollster::block_on(loader.load("models/cube.obj")).unwrap();
        assert_eq!(fragment.mesh_count(), 1);
    }
}
