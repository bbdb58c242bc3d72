//! Scene graph: the owned node hierarchy of a loaded model.
//!
//! A [`Model`] is a root pose over a forest of [`Node`]s. Each node has a
//! local [`Instance`], its meshes and its children. World transforms are
//! computed on traversal rather than cached, so hooks can edit any local
//! transform freely between frames.

use crate::data_structures::{
    instance::Instance,
    model::{Material, Mesh, ModelVertex},
};

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub name: Option<String>,
    pub local: Instance,
    pub meshes: Vec<Mesh>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Visit every mesh under this node with its world transform.
    pub fn traverse<'a>(&'a self, parent: &Instance, visit: &mut dyn FnMut(&Instance, &'a Mesh)) {
        let world = parent * &self.local;
        for mesh in &self.meshes {
            visit(&world, mesh);
        }
        for child in &self.children {
            child.traverse(&world, visit);
        }
    }

    pub fn traverse_mut(&mut self, visit: &mut dyn FnMut(&mut Mesh)) {
        for mesh in self.meshes.iter_mut() {
            visit(mesh);
        }
        for child in self.children.iter_mut() {
            child.traverse_mut(visit);
        }
    }

    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name.as_deref() == Some(name) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// A loaded mesh asset: the root pose plus its node hierarchy.
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub name: String,
    /// Transform of the whole model in the scene. Turntable rotation and the
    /// snapshot pose act on this.
    pub pose: Instance,
    pub nodes: Vec<Node>,
}

impl Model {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            pose: Instance::new(),
            nodes,
        }
    }

    pub fn position(&self) -> cgmath::Vector3<f32> {
        self.pose.position
    }

    pub fn for_each_mesh<'a>(&'a self, visit: &mut dyn FnMut(&Instance, &'a Mesh)) {
        for node in &self.nodes {
            node.traverse(&self.pose, visit);
        }
    }

    pub fn for_each_mesh_mut(&mut self, visit: &mut dyn FnMut(&mut Mesh)) {
        for node in self.nodes.iter_mut() {
            node.traverse_mut(visit);
        }
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.for_each_mesh(&mut |_, _| count += 1);
        count
    }

    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find_map(|n| n.find(name))
    }
}

/// Convert a glTF node (and its subtree) into a [`Node`].
///
/// `buffers` holds the already-fetched binary buffers by index and
/// `materials` the document's materials by index.
pub fn to_scene_node(node: gltf::scene::Node, buffers: &[Vec<u8>], materials: &[Material]) -> Node {
    let mut meshes = Vec::new();
    if let Some(mesh) = node.mesh() {
        let mesh_name = mesh.name().unwrap_or("unknown_mesh");
        for (prim_idx, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "skipping primitive {prim_idx} of {mesh_name}: {:?} is not a triangle list",
                    primitive.mode()
                );
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| b.as_slice()));

            let mut vertices: Vec<ModelVertex> = match reader.read_positions() {
                Some(positions) => positions
                    .map(|position| ModelVertex {
                        position,
                        ..Default::default()
                    })
                    .collect(),
                None => continue,
            };
            let has_normals = match reader.read_normals() {
                Some(normals) => {
                    vertices
                        .iter_mut()
                        .zip(normals)
                        .for_each(|(v, n)| v.normal = n);
                    true
                }
                None => false,
            };
            if let Some(tex_coords) = reader.read_tex_coords(0).map(|v| v.into_f32()) {
                vertices
                    .iter_mut()
                    .zip(tex_coords)
                    .for_each(|(v, t)| v.tex_coords = t);
            }

            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertices.len() as u32).collect(),
            };
            let material = primitive
                .material()
                .index()
                .and_then(|i| materials.get(i))
                .cloned();

            let mut mesh = Mesh {
                name: mesh_name.to_string(),
                vertices,
                indices,
                material,
            };
            if !has_normals {
                mesh.compute_normals();
            }
            meshes.push(mesh);
        }
    }

    let (translation, rotation, scale) = node.transform().decomposed();
    let local = Instance {
        position: translation.into(),
        rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
        scale: scale.into(),
    };
    Node {
        name: node.name().map(str::to_string),
        local,
        meshes,
        children: node
            .children()
            .map(|child| to_scene_node(child, buffers, materials))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_mesh(name: &str) -> Mesh {
        Mesh {
            name: name.into(),
            vertices: vec![ModelVertex::default()],
            indices: vec![],
            material: Some(Material::new(name)),
        }
    }

    #[test]
    fn traversal_composes_parent_transforms() {
        let mut root = Node::new("root");
        root.local = Instance::from(cgmath::Vector3::new(1.0, 0.0, 0.0));
        let mut child = Node::new("child").with_mesh(point_mesh("leaf"));
        child.local = Instance::from(cgmath::Vector3::new(0.0, 2.0, 0.0));
        root.add_child(child);

        let mut model = Model::new("m", vec![root]);
        model.pose.position = cgmath::Vector3::new(0.0, 0.0, 3.0);

        let mut seen = Vec::new();
        model.for_each_mesh(&mut |world, mesh| seen.push((mesh.name.clone(), world.position)));
        assert_eq!(seen, vec![("leaf".to_string(), cgmath::Vector3::new(1.0, 2.0, 3.0))]);
    }

    #[test]
    fn mutable_traversal_reaches_every_mesh() {
        let mut root = Node::new("root").with_mesh(point_mesh("a"));
        root.add_child(Node::new("inner").with_mesh(point_mesh("b")));
        let mut model = Model::new("m", vec![root, Node::new("other").with_mesh(point_mesh("c"))]);

        model.for_each_mesh_mut(&mut |mesh| mesh.name.push('!'));
        let mut names = Vec::new();
        model.for_each_mesh(&mut |_, mesh| names.push(mesh.name.clone()));
        assert_eq!(names, vec!["a!", "b!", "c!"]);
        assert_eq!(model.mesh_count(), 3);
        assert!(model.find_node("inner").is_some());
    }
}
