use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::material::{Material, MaterialId};

/// Number of floats per vertex: `position.xyz`, `normal.xyz`, `uv.xy`.
pub const VERTEX_STRIDE: usize = 8;

/// Interleaved triangle geometry ready for upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Geometry {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn position(&self, index: usize) -> Vec3 {
        let base = index * VERTEX_STRIDE;
        Vec3::from_slice(&self.vertices[base..base + 3])
    }

    pub fn normal(&self, index: usize) -> Vec3 {
        let base = index * VERTEX_STRIDE + 3;
        Vec3::from_slice(&self.vertices[base..base + 3])
    }

    /// Whether any vertex lacks a normal.
    pub fn needs_normals(&self) -> bool {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    }

    /// Replaces every normal with the area-weighted average of its faces.
    pub fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertex_count()];

        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [
                triangle[0] as usize,
                triangle[1] as usize,
                triangle[2] as usize,
            ];
            let p0 = self.position(i0);
            let normal = (self.position(i1) - p0).cross(self.position(i2) - p0);
            if normal.length_squared() > f32::EPSILON {
                let normal = normal.normalize();
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }

        for (i, normal) in accum.into_iter().enumerate() {
            let normal = normal.normalize_or_zero();
            let base = i * VERTEX_STRIDE + 3;
            self.vertices[base..base + 3].copy_from_slice(&normal.to_array());
        }
    }
}

/// Translation, rotation and scale of a node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Which material a mesh currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialBinding {
    /// Index into [`SceneFragment::materials`]; resolved on attachment.
    Imported(usize),
    /// Shared instance in the scene's material registry.
    Shared(MaterialId),
    /// The asset did not specify a material.
    Unassigned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshNode {
    pub geometry: Arc<Geometry>,
    pub material: MaterialBinding,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl MeshNode {
    pub fn new(geometry: Geometry, material: MaterialBinding) -> Self {
        Self {
            geometry: Arc::new(geometry),
            material,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

/// Named node of a loaded scene graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub meshes: Vec<MeshNode>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Visits every mesh below (and including) this node.
    pub fn for_each_mesh_mut(&mut self, visit: &mut impl FnMut(&mut MeshNode)) {
        for mesh in &mut self.meshes {
            visit(mesh);
        }
        for child in &mut self.children {
            child.for_each_mesh_mut(visit);
        }
    }

    /// Visits every mesh with its world matrix, given the parent's matrix.
    pub fn for_each_mesh(&self, parent: Mat4, visit: &mut impl FnMut(&MeshNode, Mat4)) {
        let world = parent * self.transform.matrix();
        for mesh in &self.meshes {
            visit(mesh, world);
        }
        for child in &self.children {
            child.for_each_mesh(world, visit);
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len() + self.children.iter().map(Node::mesh_count).sum::<usize>()
    }
}

/// Ordered top-level groups delivered by an asset loader, plus the
/// materials that shipped with the asset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneFragment {
    pub groups: Vec<Node>,
    pub materials: Vec<Material>,
}

impl SceneFragment {
    pub fn mesh_count(&self) -> usize {
        self.groups.iter().map(Node::mesh_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        Geometry {
            vertices: vec![
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn computes_face_normals() {
        let mut geometry = triangle();
        assert!(geometry.needs_normals());
        geometry.compute_normals();
        assert!(!geometry.needs_normals());
        for i in 0..geometry.vertex_count() {
            assert!((geometry.normal(i) - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn world_matrices_compose_down_the_tree() {
        let mut child = Node::group("child");
        child.transform.translation = Vec3::new(0.0, 1.0, 0.0);
        child
            .meshes
            .push(MeshNode::new(triangle(), MaterialBinding::Unassigned));
        let mut root = Node::group("root");
        root.transform.translation = Vec3::new(2.0, 0.0, 0.0);
        root.children.push(child);

        let mut origins = Vec::new();
        root.for_each_mesh(Mat4::IDENTITY, &mut |_, world| {
            origins.push(world.transform_point3(Vec3::ZERO));
        });
        assert_eq!(origins, vec![Vec3::new(2.0, 1.0, 0.0)]);
        assert_eq!(root.mesh_count(), 1);
    }
}
