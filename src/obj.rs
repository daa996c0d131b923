use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::fragment::{Geometry, MaterialBinding, MeshNode, Node, SceneFragment};
use crate::material::Material;

/// Parses a grouped OBJ file from memory.
///
/// Every `o`/`g` statement opens a new top-level group; faces that precede
/// the first one land in an unnamed group. `usemtl` names become imported
/// standard materials, so a group with several materials holds one mesh per
/// material. Vertices are laid out as `position.xyz`, `normal.xyz`, `uv.xy`.
pub fn load_obj_from_str(data: &str) -> Result<SceneFragment> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut groups: Vec<GroupBuilder> = Vec::new();
    let mut materials: Vec<Material> = Vec::new();
    let mut current_material = MaterialBinding::Unassigned;

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "o" | "g" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                groups.push(GroupBuilder::new(name));
            }
            "usemtl" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                let index = match materials.iter().position(|m| m.name == name) {
                    Some(index) => index,
                    None => {
                        materials.push(Material::standard(name));
                        materials.len() - 1
                    }
                };
                current_material = MaterialBinding::Imported(index);
            }
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                if groups.is_empty() {
                    groups.push(GroupBuilder::new(String::new()));
                }
                if let Some(group) = groups.last_mut() {
                    triangulate_face(&polygon, group.faces_for(current_material));
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let attributes = Attributes {
        positions: &positions,
        normals: &normals,
        uvs: &uvs,
    };
    let mut fragment = SceneFragment {
        groups: Vec::with_capacity(groups.len()),
        materials,
    };
    for group in groups {
        let mut node = Node::group(group.name);
        for (binding, faces) in group.meshes {
            let mut geometry = build_geometry(&attributes, &faces)?;
            if geometry.needs_normals() {
                geometry.compute_normals();
            }
            node.meshes.push(MeshNode::new(geometry, binding));
        }
        fragment.groups.push(node);
    }
    Ok(fragment)
}

struct GroupBuilder {
    name: String,
    meshes: Vec<(MaterialBinding, Vec<[FaceIndex; 3]>)>,
}

impl GroupBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            meshes: Vec::new(),
        }
    }

    fn faces_for(&mut self, binding: MaterialBinding) -> &mut Vec<[FaceIndex; 3]> {
        let index = match self.meshes.iter().position(|(known, _)| *known == binding) {
            Some(index) => index,
            None => {
                self.meshes.push((binding, Vec::new()));
                self.meshes.len() - 1
            }
        };
        &mut self.meshes[index].1
    }
}

fn next_component<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    Ok(parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = next_component(&mut parts)?;
    let y = next_component(&mut parts)?;
    let z = next_component(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = next_component(&mut parts)?;
    let v = next_component(&mut parts)?;
    Ok(Vec2::new(u, v))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let mut optional = || -> Result<i32> {
            match segments.next() {
                Some(s) if !s.is_empty() => Ok(s.parse::<i32>()?),
                _ => Ok(0),
            }
        };
        let vt = optional()?;
        let vn = optional()?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..polygon.len().saturating_sub(1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

struct Attributes<'a> {
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    uvs: &'a [Vec2],
}

fn build_geometry(attributes: &Attributes<'_>, faces: &[[FaceIndex; 3]]) -> Result<Geometry> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut geometry = Geometry::default();

    for face in faces {
        for idx in face {
            let position = fix_index(idx.v, attributes.positions.len())
                .ok_or_else(|| anyhow!("invalid vertex index {}", idx.v))?;
            let key = Key {
                position,
                uv: fix_index(idx.vt, attributes.uvs.len()),
                normal: fix_index(idx.vn, attributes.normals.len()),
            };
            let next_index = geometry.vertex_count() as u32;
            let vertices = &mut geometry.vertices;
            let entry = lookup.entry(key).or_insert_with(|| {
                let position = attributes.positions[key.position];
                let normal = key.normal.map_or(Vec3::ZERO, |i| attributes.normals[i]);
                // OBJ puts the texture origin at the bottom left.
                let uv = key
                    .uv
                    .map_or(Vec2::ZERO, |i| Vec2::new(attributes.uvs[i].x, 1.0 - attributes.uvs[i].y));
                vertices.extend_from_slice(&position.to_array());
                vertices.extend_from_slice(&normal.to_array());
                vertices.extend_from_slice(&uv.to_array());
                next_index
            });
            geometry.indices.push(*entry);
        }
    }

    Ok(geometry)
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::VERTEX_STRIDE;

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let fragment = load_obj_from_str(obj).unwrap();
        assert_eq!(fragment.groups.len(), 1);
        let geometry = &fragment.groups[0].meshes[0].geometry;
        assert_eq!(geometry.indices, vec![0, 1, 2]);
        assert_eq!(geometry.vertices.len(), 3 * VERTEX_STRIDE);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let fragment = load_obj_from_str(obj).unwrap();
        let geometry = &fragment.groups[0].meshes[0].geometry;
        for i in 0..geometry.vertex_count() {
            assert!((geometry.normal(i).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn groups_become_named_nodes() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
vt 0 0
vt 1 1
o Frame
f 1/1 2/2 3/1
g Floor
usemtl Tiles
f -4 -3 -2 -1
";
        let fragment = load_obj_from_str(obj).unwrap();
        let names: Vec<_> = fragment.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Frame", "Floor"]);

        let frame = &fragment.groups[0].meshes[0];
        assert_eq!(frame.material, MaterialBinding::Unassigned);
        // v flipped: vt 1 1 reads back as (1, 0)
        assert_eq!(&frame.geometry.vertices[14..16], &[1.0, 0.0]);

        let floor = &fragment.groups[1].meshes[0];
        assert_eq!(floor.material, MaterialBinding::Imported(0));
        assert_eq!(floor.geometry.triangle_count(), 2);
        assert_eq!(fragment.materials[0].name, "Tiles");
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n";
        assert!(load_obj_from_str(obj).is_err());
        assert!(load_obj_from_str("# nothing\n").is_err());
    }
}
