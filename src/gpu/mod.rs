//! wgpu backend: turns a `DrawList` into quads on the window surface.

pub mod quad;
pub mod text;

use std::collections::HashMap;
use std::sync::Arc;

use winit::window::Window;

use crate::data::DataManager;
use crate::error::{ClientError, Result};
use crate::ui::{DrawCommand, DrawList, Rect};
use quad::{
    MODE_ELLIPSE, Quad, QuadBatcher, QuadPipeline, TextKey, TextureKey, linear_color, scissor,
    srgb_to_linear,
};
use text::{SharedText, to_rgba8};

/// Window clear color, sRGB.
const BG_SRGB: [f32; 3] = [0.05, 0.05, 0.07];

struct Texture {
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
    used: bool,
}

pub struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    window: Arc<Window>,
    quads: QuadPipeline,
    batcher: QuadBatcher,
    white: wgpu::BindGroup,
    textures: HashMap<TextureKey, Texture>,
    text: SharedText,
}

impl Gpu {
    pub fn new(window: Arc<Window>, text: SharedText) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| ClientError::Gpu(format!("create surface: {e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| ClientError::Gpu("no suitable GPU adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("chimera_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        ))
        .map_err(|e| ClientError::Gpu(format!("request device: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or_else(|| ClientError::Gpu("surface has no formats".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let quads = QuadPipeline::new(&device, format);
        quads.set_viewport(&queue, config.width, config.height);
        let white = upload(&device, &queue, &quads, "white", 1, 1, &[255; 4]);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            window,
            quads,
            batcher: QuadBatcher::default(),
            white,
            textures: HashMap::new(),
            text,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.quads.set_viewport(&self.queue, width, height);
        }
    }

    /// Look up or create the texture for `key`. Returns its pixel size.
    fn ensure(&mut self, key: &TextureKey, data: &DataManager) -> Option<(u32, u32)> {
        if let Some(tex) = self.textures.get_mut(key) {
            tex.used = true;
            return Some((tex.width, tex.height));
        }
        let (label, width, height, pixels) = match key {
            TextureKey::Image { id, grayscale } => {
                let Some(image) = data.image(*id) else {
                    data.request_image(*id);
                    return None;
                };
                let pixels = if *grayscale {
                    image.gray.clone()
                } else {
                    image.rgba.clone()
                };
                ("image", image.width, image.height, pixels)
            }
            TextureKey::Text(t) => {
                let bitmap = self.text.rasterize(&t.text, t.color, t.outline)?;
                ("text", bitmap.width, bitmap.height, bitmap.rgba)
            }
        };
        if width == 0 || height == 0 {
            return None;
        }
        let bind_group = upload(
            &self.device,
            &self.queue,
            &self.quads,
            label,
            width,
            height,
            &pixels,
        );
        self.textures.insert(
            key.clone(),
            Texture {
                bind_group,
                width,
                height,
                used: true,
            },
        );
        Some((width, height))
    }

    fn batch(&mut self, list: &DrawList, data: &DataManager) {
        self.batcher.clear();
        for item in &list.items {
            match &item.command {
                DrawCommand::Panel(p) => {
                    let mut quad = Quad::solid(p.rect, linear_color(p.bg_color));
                    quad.border_color = linear_color(p.border_color);
                    quad.border_width = p.border_width;
                    if p.ellipse {
                        quad.mode = MODE_ELLIPSE;
                    }
                    self.batcher.push(quad, None, item.clip);
                }
                DrawCommand::Image(img) => {
                    let key = TextureKey::Image {
                        id: img.image_id,
                        grayscale: img.grayscale,
                    };
                    if self.ensure(&key, data).is_some() {
                        let quad = Quad::textured(img.rect, linear_color(img.tint));
                        self.batcher.push(quad, Some(key), item.clip);
                    }
                }
                DrawCommand::Text(t) => {
                    let outline = t.outline_color.map(to_rgba8);
                    let key = TextureKey::Text(TextKey {
                        text: t.text.clone(),
                        color: to_rgba8(t.color),
                        outline,
                    });
                    if let Some((w, h)) = self.ensure(&key, data) {
                        let pad = if outline.is_some() { 1.0 } else { 0.0 };
                        let rect = Rect::new(t.x - pad, t.y - pad, w as f32, h as f32);
                        self.batcher
                            .push(Quad::textured(rect, [1.0; 4]), Some(key), item.clip);
                    }
                }
            }
        }
    }

    /// Drop textures for reloaded images and text not drawn last frame.
    fn evict(&mut self, data: &DataManager) {
        for id in data.take_cleared() {
            for grayscale in [false, true] {
                self.textures.remove(&TextureKey::Image { id, grayscale });
            }
        }
        self.textures.retain(|key, tex| {
            let keep = tex.used || matches!(key, TextureKey::Image { .. });
            tex.used = false;
            keep
        });
    }

    pub fn render(&mut self, list: &DrawList, data: &DataManager) {
        self.evict(data);
        self.batch(list, data);
        self.quads
            .upload(&self.device, &self.queue, &self.batcher.vertices);

        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("out of GPU memory");
                return;
            }
            Err(e) => {
                log::warn!("surface error: {e:?}");
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ui_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: srgb_to_linear(BG_SRGB[0]) as f64,
                            g: srgb_to_linear(BG_SRGB[1]) as f64,
                            b: srgb_to_linear(BG_SRGB[2]) as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });

            if !self.batcher.vertices.is_empty() {
                pass.set_pipeline(&self.quads.pipeline);
                pass.set_bind_group(0, &self.quads.bind_group, &[]);
                pass.set_vertex_buffer(0, self.quads.vertex_buffer().slice(..));
                for batch in &self.batcher.batches {
                    let Some((x, y, w, h)) =
                        scissor(&batch.clip, self.config.width, self.config.height)
                    else {
                        continue;
                    };
                    let group = match &batch.texture {
                        Some(key) => match self.textures.get(key) {
                            Some(tex) => &tex.bind_group,
                            None => continue,
                        },
                        None => &self.white,
                    };
                    pass.set_scissor_rect(x, y, w, h);
                    pass.set_bind_group(1, group, &[]);
                    pass.draw(batch.vertices.clone(), 0..1);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    quads: &QuadPipeline,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> wgpu::BindGroup {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &quads.texture_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&quads.sampler),
            },
        ],
    })
}
