//! Loading meshes and textures from external sources.
//!
//! - `source` fetches raw bytes (files, `file://`, `http(s)://`, `data:`)
//! - `mesh` converts OBJ meshes
//! - `texture` resolves material textures and binds them onto a model

use std::{
    io::{BufReader, Cursor},
    path::Path,
    sync::Arc,
};

use anyhow::Context;

use crate::{
    data_structures::{
        model::Material,
        scene_graph::{Model, Node, to_scene_node},
        texture::Texture,
    },
    resources::{
        source::{AssetSource, decode_data_uri, is_data_uri, resolve_relative},
        texture::{binding_settings, load_texture},
    },
};

pub mod mesh;
pub mod source;
pub mod texture;

/// Load a mesh asset, picking the format from the URI's extension.
/// Anything that is not `.obj` is read as glTF (`.gltf` or `.glb`).
pub async fn load_model(source: &dyn AssetSource, uri: &str) -> anyhow::Result<Model> {
    let extension = Path::new(uri.split(['?', '#']).next().unwrap_or(uri))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("obj") => load_model_obj(source, uri).await,
        _ => load_model_gltf(source, uri).await,
    }
}

fn model_name(uri: &str) -> String {
    Path::new(uri)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string()
}

pub async fn load_model_obj(source: &dyn AssetSource, file_name: &str) -> anyhow::Result<Model> {
    let obj_data = source.fetch(file_name).await?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_data));

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| async move {
            let mtl_uri = resolve_relative(file_name, &p);
            match source.fetch(&mtl_uri).await {
                Ok(data) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(data))),
                Err(e) => {
                    log::warn!("material library {mtl_uri} could not be loaded: {e:#}");
                    Err(tobj::LoadError::OpenFileFailed)
                }
            }
        },
    )
    .await
    .with_context(|| format!("parsing {file_name}"))?;

    let obj_materials = obj_materials.unwrap_or_else(|e| {
        log::warn!("{file_name} is rendered without its materials: {e}");
        Vec::new()
    });
    let mut materials = Vec::with_capacity(obj_materials.len());
    for m in obj_materials {
        let mut material = Material::new(m.name.as_str());
        if let Some([r, g, b]) = m.diffuse {
            material.base_color = [r, g, b, m.dissolve.unwrap_or(1.0)];
        }
        if let Some(diffuse_texture) = &m.diffuse_texture {
            let uri = resolve_relative(file_name, diffuse_texture);
            match load_texture(source, &uri).await {
                Ok(texture) => {
                    let settings = binding_settings(&texture);
                    material.map = Some(Arc::new(texture.configured(settings)));
                }
                Err(e) => log::warn!("texture {uri} of material {} skipped: {e:#}", m.name),
            }
        }
        materials.push(material);
    }

    let meshes = mesh::load_meshes(&models, &materials);
    let nodes = meshes
        .into_iter()
        .map(|mesh| Node::new(mesh.name.clone()).with_mesh(mesh))
        .collect();
    Ok(Model::new(model_name(file_name), nodes))
}

pub async fn load_model_gltf(source: &dyn AssetSource, file_name: &str) -> anyhow::Result<Model> {
    let gltf_data = source.fetch(file_name).await?;
    let gltf = gltf::Gltf::from_slice(&gltf_data).with_context(|| format!("parsing {file_name}"))?;

    // Load buffers
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .with_context(|| format!("{file_name} references a missing binary chunk"))?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) if is_data_uri(uri) => {
                buffer_data.push(decode_data_uri(uri)?);
            }
            gltf::buffer::Source::Uri(uri) => {
                let uri = resolve_relative(file_name, uri);
                let bin = source
                    .fetch(&uri)
                    .await
                    .with_context(|| format!("loading buffer {uri}"))?;
                buffer_data.push(bin);
            }
        }
    }

    // Load materials
    let mut materials = Vec::new();
    for material in gltf.materials() {
        let pbr = material.pbr_metallic_roughness();
        let name = material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material_{}", material.index().unwrap_or(0)));
        let mut mat = Material::new(name);
        mat.base_color = pbr.base_color_factor();
        mat.double_sided = material.double_sided();

        if let Some(info) = pbr.base_color_texture() {
            let texture = match info.texture().source().source() {
                gltf::image::Source::View { view, .. } => {
                    let start = view.offset();
                    let end = start + view.length();
                    buffer_data
                        .get(view.buffer().index())
                        .and_then(|b| b.get(start..end))
                        .context("image view out of range")
                        .and_then(|bytes| Texture::from_bytes(bytes, &mat.name))
                }
                gltf::image::Source::Uri { uri, .. } => {
                    load_texture(source, &resolve_relative(file_name, uri)).await
                }
            };
            match texture {
                Ok(texture) => {
                    let settings = binding_settings(&texture);
                    mat.map = Some(Arc::new(texture.configured(settings)));
                }
                Err(e) => log::warn!("base color texture of {} skipped: {e:#}", mat.name),
            }
        }
        materials.push(mat);
    }

    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .with_context(|| format!("{file_name} contains no scene"))?;
    let nodes = scene
        .nodes()
        .map(|node| to_scene_node(node, &buffer_data, &materials))
        .collect();

    Ok(Model::new(model_name(file_name), nodes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_come_from_file_stem() {
        assert_eq!(model_name("assets/Pillow_highpoly.gltf"), "Pillow_highpoly");
        assert_eq!(model_name("https://example.com/m/box.glb"), "box");
    }
}
