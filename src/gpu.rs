//! Headless GPU access.
//!
//! A turntable never presents to a window: every pass renders into an
//! offscreen texture that is copied into a mappable buffer and read back as
//! an [`RgbaImage`].

use std::iter;

use anyhow::Context as _;
use image::RgbaImage;

pub struct Gpu {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl Gpu {
    /// Request an adapter without a surface. Falls back to a software
    /// adapter when no hardware one is available.
    pub async fn new() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let adapter = match instance.request_adapter(&adapter_options(false)).await {
            Ok(adapter) => adapter,
            Err(e) => {
                log::warn!("no hardware adapter ({e}), trying a fallback adapter");
                instance
                    .request_adapter(&adapter_options(true))
                    .await
                    .context("no wgpu adapter available")?
            }
        };
        log::debug!("rendering on {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("turntable device"),
                required_features: wgpu::Features::empty(),
                // Downlevel limits keep GL and software adapters usable; the
                // texture size limits follow the adapter so large GIFs still fit.
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await
            .context("requesting wgpu device")?;

        Ok(Self { device, queue })
    }

    pub fn max_texture_side(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Copy an RGBA8 texture back to the CPU.
    ///
    /// Rows in the staging buffer are padded to
    /// [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`]; the padding is stripped here.
    pub async fn read_rgba(&self, texture: &wgpu::Texture) -> anyhow::Result<RgbaImage> {
        let size = texture.size();
        let (width, height) = (size.width, size.height);
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback buffer"),
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        // The mapping has to be requested before polling, otherwise the wait never ends.
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .context("waiting for the readback copy")?;
        rx.receive()
            .await
            .context("readback mapping was dropped")?
            .context("mapping the readback buffer")?;

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        RgbaImage::from_raw(width, height, pixels).context("readback does not match the texture size")
    }
}

fn adapter_options(fallback: bool) -> wgpu::RequestAdapterOptions<'static, 'static> {
    wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: None,
        force_fallback_adapter: fallback,
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn readback_rows_are_padded_to_copy_alignment() {
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        assert_eq!((3 * 4u32).div_ceil(align) * align, 256);
        assert_eq!((64 * 4u32).div_ceil(align) * align, 256);
        assert_eq!((65 * 4u32).div_ceil(align) * align, 512);
    }

    #[tokio::test]
    #[cfg(feature = "integration-tests")]
    async fn cleared_texture_reads_back_unpadded() {
        let gpu = super::Gpu::new().await.unwrap();
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("clear target"),
            size: wgpu::Extent3d {
                width: 3,
                height: 2,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::RED),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        let image = gpu.read_rgba(&texture).await.unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert!(image.pixels().all(|p| p.0 == [255, 0, 0, 255]));
    }
}
