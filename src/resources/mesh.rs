use crate::data_structures::model::{self, Material};

/**
 * Converts tobj meshes into owned meshes. OBJ texture coordinates have V pointing up, so V is
 * flipped to the top-down convention the rest of the crate uses. Missing normals are computed
 * from the faces.
 */
pub fn load_meshes(models: &[tobj::Model], materials: &[Material]) -> Vec<model::Mesh> {
    models
        .iter()
        .map(|m| {
            let has_normals = m.mesh.normals.len() == m.mesh.positions.len();
            let vertices = (0..m.mesh.positions.len() / 3)
                .map(|i| model::ModelVertex {
                    position: [
                        m.mesh.positions[i * 3],
                        m.mesh.positions[i * 3 + 1],
                        m.mesh.positions[i * 3 + 2],
                    ],
                    tex_coords: [
                        m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                        1.0 - m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
                    ],
                    normal: [
                        m.mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                        m.mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                        m.mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
                    ],
                })
                .collect::<Vec<_>>();

            let mut mesh = model::Mesh {
                name: m.name.clone(),
                vertices,
                // The indices are for positions, texels, and normals because we set `single_index` to true
                indices: m.mesh.indices.clone(),
                material: m
                    .mesh
                    .material_id
                    .and_then(|id| materials.get(id))
                    .cloned(),
            };
            if !has_normals {
                mesh.compute_normals();
            }
            mesh
        })
        .collect::<Vec<_>>()
}
