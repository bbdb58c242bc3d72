//! Mesh and material definitions.

use std::sync::Arc;

use cgmath::InnerSpace;

use crate::data_structures::texture::Texture;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl ModelVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Material {
    /// Textures are matched to meshes through this name.
    pub name: String,
    /// Linear RGBA factor multiplied with the sampled map.
    pub base_color: [f32; 4],
    /// Disables back-face culling for meshes using this material.
    pub double_sided: bool,
    pub map: Option<Arc<Texture>>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_color: [1.0, 1.0, 1.0, 1.0],
            double_sided: false,
            map: None,
        }
    }
}

/// Indexed triangle list with an optional material.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material: Option<Material>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Name of the bound material, if any.
    pub fn material_name(&self) -> Option<&str> {
        self.material.as_ref().map(|m| m.name.as_str())
    }

    /// Fill in smooth vertex normals from face normals. Used when the source
    /// asset carries no normals of its own.
    pub fn compute_normals(&mut self) {
        let mut acc = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); self.vertices.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= acc.len() || b >= acc.len() || c >= acc.len() {
                continue;
            }
            let pa: cgmath::Vector3<f32> = self.vertices[a].position.into();
            let pb: cgmath::Vector3<f32> = self.vertices[b].position.into();
            let pc: cgmath::Vector3<f32> = self.vertices[c].position.into();
            // Area weighted: the cross product is not normalized.
            let n = (pb - pa).cross(pc - pa);
            acc[a] += n;
            acc[b] += n;
            acc[c] += n;
        }
        for (vertex, n) in self.vertices.iter_mut().zip(acc) {
            if n.magnitude2() > 0.0 {
                vertex.normal = n.normalize().into();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertices_cast_to_tightly_packed_bytes() {
        let vertices = [
            ModelVertex {
                position: [1.0, 2.0, 3.0],
                tex_coords: [0.25, 0.75],
                normal: [0.0, 0.0, 1.0],
            },
            ModelVertex::default(),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(std::mem::size_of::<ModelVertex>(), 32);
        assert_eq!(bytes.len(), 64);
        assert_eq!(ModelVertex::desc().array_stride, 32);
        let floats: &[f32] = bytemuck::cast_slice(&vertices);
        assert_eq!(&floats[..8], &[1.0, 2.0, 3.0, 0.25, 0.75, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn computed_normals_face_out_of_ccw_triangle() {
        let mut mesh = Mesh {
            name: "tri".into(),
            vertices: vec![
                ModelVertex {
                    position: [0.0, 0.0, 0.0],
                    ..Default::default()
                },
                ModelVertex {
                    position: [1.0, 0.0, 0.0],
                    ..Default::default()
                },
                ModelVertex {
                    position: [0.0, 1.0, 0.0],
                    ..Default::default()
                },
            ],
            indices: vec![0, 1, 2],
            material: None,
        };
        mesh.compute_normals();
        for v in &mesh.vertices {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
    }
}
