//! Material textures: the name → URI table, loading, and binding.
//!
//! Resolution runs in four steps:
//!
//! 1. optional dedup, turning repeated URIs into aliases of the material
//!    that introduced them
//! 2. concurrent fetch and decode of every owned URI; aliases resolve
//!    afterwards in one hop
//! 3. aspect normalization on the GPU, once per loaded texture
//! 4. binding onto the meshes whose material names match

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::future::try_join_all;

use crate::{
    data_structures::{
        scene_graph::Model,
        texture::{ColorSpace, FilterMode, SamplerSettings, Texture},
    },
    error::{Result, TurntableError},
    gpu::Gpu,
    pipelines::composite::{Compositor, SquarePredicate},
    resources::source::AssetSource,
};

/// Where a material's texture comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextureSource {
    /// Fetch from this URI.
    Uri(String),
    /// Share the texture of the named material.
    Alias(String),
}

/// Material name → texture source, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextureSources {
    entries: Vec<(String, TextureSource)>,
}

impl TextureSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `material` to `uri`. Re-inserting a material replaces its URI but
    /// keeps its position.
    pub fn insert(&mut self, material: impl Into<String>, uri: impl Into<String>) {
        let material = material.into();
        let source = TextureSource::Uri(uri.into());
        match self.entries.iter_mut().find(|(name, _)| *name == material) {
            Some(entry) => entry.1 = source,
            None => self.entries.push((material, source)),
        }
    }

    pub fn get(&self, material: &str) -> Option<&TextureSource> {
        self.entries
            .iter()
            .find(|(name, _)| name == material)
            .map(|(_, source)| source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TextureSource)> {
        self.entries.iter().map(|(name, source)| (name.as_str(), source))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every repeated URI with an alias of the first material that
    /// used it, so each distinct URI is fetched once. URIs compare as
    /// written; whitespace is only trimmed when fetching.
    pub fn dedup(&mut self) {
        let mut first_seen: HashMap<String, String> = HashMap::new();
        for (material, source) in self.entries.iter_mut() {
            let TextureSource::Uri(uri) = source else {
                continue;
            };
            match first_seen.get(uri.as_str()) {
                Some(owner) => *source = TextureSource::Alias(owner.clone()),
                None => {
                    first_seen.insert(uri.clone(), material.clone());
                }
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TextureSources {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut sources = TextureSources::new();
        for (material, uri) in iter {
            sources.insert(material, uri);
        }
        sources
    }
}

/// A loaded texture ready to be bound to `material`.
#[derive(Clone, Debug)]
pub struct ResolvedTexture {
    pub material: String,
    pub texture: Arc<Texture>,
}

pub async fn load_texture(source: &dyn AssetSource, uri: &str) -> anyhow::Result<Texture> {
    let data = source.fetch(uri).await?;
    Texture::from_bytes(&data, uri)
}

/// Fetch and decode every texture in `sources`.
///
/// Owned URIs load concurrently and the first failure aborts the whole
/// batch. The result keeps the order of `sources`; aliased materials share
/// the `Arc` of their target.
pub async fn resolve_textures(source: &dyn AssetSource, sources: &TextureSources) -> Result<Vec<ResolvedTexture>> {
    let loads = sources.iter().filter_map(|(material, entry)| match entry {
        TextureSource::Uri(uri) => Some(async move {
            let uri = uri.trim();
            log::debug!("material {material} -> {uri}");
            let texture = load_texture(source, uri)
                .await
                .map_err(|e| TurntableError::load(uri, e))?;
            Ok::<_, TurntableError>((material, Arc::new(texture)))
        }),
        TextureSource::Alias(_) => None,
    });
    let owned: HashMap<&str, Arc<Texture>> = try_join_all(loads).await?.into_iter().collect();

    sources
        .iter()
        .map(|(material, entry)| {
            let target = match entry {
                TextureSource::Uri(_) => material,
                TextureSource::Alias(target) => target.as_str(),
            };
            let texture = owned.get(target).cloned().ok_or_else(|| {
                TurntableError::load(
                    target,
                    anyhow::anyhow!("alias of {material} does not name a loaded texture"),
                )
            })?;
            Ok(ResolvedTexture {
                material: material.to_string(),
                texture,
            })
        })
        .collect()
}

/// Square up every texture whose aspect the predicate rejects.
///
/// Each distinct loaded texture is composited once; materials that shared
/// an `Arc` before share the normalized one after.
pub async fn normalize_textures(
    gpu: &Gpu,
    compositor: &Compositor,
    textures: Vec<ResolvedTexture>,
    fill: [u8; 3],
    predicate: &SquarePredicate,
) -> Result<Vec<ResolvedTexture>> {
    let mut normalized: HashMap<*const Texture, Arc<Texture>> = HashMap::new();
    let mut out = Vec::with_capacity(textures.len());
    for resolved in textures {
        let key = Arc::as_ptr(&resolved.texture);
        let texture = match normalized.get(&key) {
            Some(texture) => texture.clone(),
            None => {
                let texture = match compositor
                    .normalize(gpu, &resolved.texture, fill, predicate)
                    .await
                    .map_err(|e| TurntableError::load(resolved.texture.label.clone(), e))?
                {
                    Some(square) => Arc::new(square),
                    None => resolved.texture.clone(),
                };
                normalized.insert(key, texture.clone());
                texture
            }
        };
        out.push(ResolvedTexture {
            material: resolved.material,
            texture,
        });
    }
    Ok(out)
}

/// Sampler state textures are bound with: no V flip, sRGB, mipmapped, and
/// trilinear only when both sides are powers of two.
pub fn binding_settings(texture: &Texture) -> SamplerSettings {
    SamplerSettings {
        flip_y: false,
        generate_mipmaps: true,
        min_filter: if texture.is_power_of_two() {
            FilterMode::LinearMipmapLinear
        } else {
            FilterMode::Linear
        },
        color_space: ColorSpace::Srgb,
    }
}

/// Bind resolved textures onto every mesh whose material name matches.
///
/// Fails with [`TurntableError::Application`] when some textures matched no
/// mesh at all.
pub fn apply_textures(model: &mut Model, textures: &[ResolvedTexture]) -> Result<()> {
    let by_material: HashMap<&str, &Arc<Texture>> = textures
        .iter()
        .map(|t| (t.material.as_str(), &t.texture))
        .collect();
    // Aliases share one configured copy, keyed by the loaded texture.
    let mut configured: HashMap<*const Texture, Arc<Texture>> = HashMap::new();
    let mut bound: HashSet<String> = HashSet::new();

    model.for_each_mesh_mut(&mut |mesh| {
        let Some(material) = mesh.material.as_mut() else {
            return;
        };
        let Some(texture) = by_material.get(material.name.as_str()) else {
            return;
        };
        let ready = configured
            .entry(Arc::as_ptr(texture))
            .or_insert_with(|| Arc::new(texture.configured(binding_settings(texture))))
            .clone();
        material.map = Some(ready);
        bound.insert(material.name.clone());
    });

    let unmatched = by_material.keys().filter(|name| !bound.contains(**name)).count();
    if unmatched > 0 {
        log::error!("{unmatched} textures not applied");
        return Err(TurntableError::Application { unmatched });
    }
    Ok(())
}
