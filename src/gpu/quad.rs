//! One pipeline for everything the UI draws: boxes, ellipses, and textured
//! quads. Quads are collected into batches that share a texture and a clip.

use std::ops::Range;

use crate::ui::Rect;

pub const MODE_BOX: f32 = 0.0;
pub const MODE_ELLIPSE: f32 = 1.0;
pub const MODE_TEXTURE: f32 = 2.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub size_px: [f32; 2],
    pub color: [f32; 4],
    pub border_color: [f32; 4],
    pub border_width: f32,
    pub mode: f32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadUniforms {
    pub projection: [[f32; 4]; 4],
}

/// What a quad samples from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextureKey {
    Image { id: u32, grayscale: bool },
    Text(TextKey),
}

/// Rasterized text is cached by content and colors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextKey {
    pub text: String,
    pub color: [u8; 4],
    pub outline: Option<[u8; 4]>,
}

/// A run of vertices drawn with one texture under one scissor.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub texture: Option<TextureKey>,
    pub clip: Rect,
    pub vertices: Range<u32>,
}

/// One quad's inputs.
#[derive(Debug, Clone, Copy)]
pub struct Quad {
    pub rect: Rect,
    pub color: [f32; 4],
    pub border_color: [f32; 4],
    pub border_width: f32,
    pub mode: f32,
}

impl Quad {
    pub fn solid(rect: Rect, color: [f32; 4]) -> Self {
        Self {
            rect,
            color,
            border_color: [0.0; 4],
            border_width: 0.0,
            mode: MODE_BOX,
        }
    }

    pub fn textured(rect: Rect, tint: [f32; 4]) -> Self {
        Self {
            mode: MODE_TEXTURE,
            ..Self::solid(rect, tint)
        }
    }
}

/// Per-frame vertex and batch accumulator.
#[derive(Debug, Default)]
pub struct QuadBatcher {
    pub vertices: Vec<QuadVertex>,
    pub batches: Vec<Batch>,
}

impl QuadBatcher {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.batches.clear();
    }

    /// Append six vertices, extending the last batch when texture and clip
    /// match.
    pub fn push(&mut self, quad: Quad, texture: Option<TextureKey>, clip: Rect) {
        let Rect {
            x,
            y,
            width,
            height,
        } = quad.rect;
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let start = self.vertices.len() as u32;
        let make = |px: f32, py: f32, u: f32, v: f32| QuadVertex {
            position: [px, py],
            uv: [u, v],
            size_px: [width, height],
            color: quad.color,
            border_color: quad.border_color,
            border_width: quad.border_width,
            mode: quad.mode,
        };
        let (x1, y1) = (x + width, y + height);
        self.vertices.extend([
            make(x, y, 0.0, 0.0),
            make(x1, y, 1.0, 0.0),
            make(x, y1, 0.0, 1.0),
            make(x1, y, 1.0, 0.0),
            make(x1, y1, 1.0, 1.0),
            make(x, y1, 0.0, 1.0),
        ]);
        let end = self.vertices.len() as u32;

        match self.batches.last_mut() {
            Some(last) if last.texture == texture && last.clip == clip => {
                last.vertices.end = end;
            }
            _ => self.batches.push(Batch {
                texture,
                clip,
                vertices: start..end,
            }),
        }
    }
}

/// sRGB component to linear, for a blend done in linear space.
pub fn srgb_to_linear(s: f32) -> f32 {
    if s <= 0.04045 {
        s / 12.92
    } else {
        ((s + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_color(c: [f32; 4]) -> [f32; 4] {
    [
        srgb_to_linear(c[0]),
        srgb_to_linear(c[1]),
        srgb_to_linear(c[2]),
        c[3],
    ]
}

/// Integer scissor for `clip`, clamped to the surface. `None` when nothing
/// would be drawn.
pub fn scissor(clip: &Rect, surface_w: u32, surface_h: u32) -> Option<(u32, u32, u32, u32)> {
    let screen = Rect::new(0.0, 0.0, surface_w as f32, surface_h as f32);
    let r = clip.intersect(&screen);
    if r.is_empty() {
        return None;
    }
    let x0 = r.x.floor().max(0.0) as u32;
    let y0 = r.y.floor().max(0.0) as u32;
    let x1 = ((r.x + r.width).ceil() as u32).min(surface_w);
    let y1 = ((r.y + r.height).ceil() as u32).min(surface_h);
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1 - x0, y1 - y0))
}

pub struct QuadPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group: wgpu::BindGroup,
    pub texture_layout: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
    vertex_capacity: usize,
}

impl QuadPipeline {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad_uniforms"),
            size: std::mem::size_of::<QuadUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let initial_capacity = 6 * 512;
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad_vertices"),
            size: (initial_capacity * std::mem::size_of::<QuadVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad_uniform_group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        // Pixel art: no filtering.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quad_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("quad.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("quad_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x2,
                        1 => Float32x2,
                        2 => Float32x2,
                        3 => Float32x4,
                        4 => Float32x4,
                        5 => Float32,
                        6 => Float32,
                    ],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group,
            texture_layout,
            sampler,
            uniform_buffer,
            vertex_buffer,
            vertex_capacity: initial_capacity,
        }
    }

    /// Orthographic projection with the origin at the top left.
    pub fn set_viewport(&self, queue: &wgpu::Queue, width: u32, height: u32) {
        let sw = width.max(1) as f32;
        let sh = height.max(1) as f32;

        #[rustfmt::skip]
        let projection: [[f32; 4]; 4] = [
            [2.0 / sw,  0.0,        0.0, 0.0],
            [0.0,      -2.0 / sh,   0.0, 0.0],
            [0.0,       0.0,        1.0, 0.0],
            [-1.0,      1.0,        0.0, 1.0],
        ];
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&QuadUniforms { projection }),
        );
    }

    /// Upload the frame's vertices, growing the buffer when needed.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, vertices: &[QuadVertex]) {
        if vertices.is_empty() {
            return;
        }
        if vertices.len() > self.vertex_capacity {
            self.vertex_capacity = vertices.len().next_power_of_two();
            self.vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("quad_vertices"),
                size: (self.vertex_capacity * std::mem::size_of::<QuadVertex>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(vertices));
    }

    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: u32) -> Option<TextureKey> {
        Some(TextureKey::Image {
            id,
            grayscale: false,
        })
    }

    #[test]
    fn vertex_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 64);
    }

    #[test]
    fn batches_split_on_texture_and_clip() {
        let clip = Rect::new(0.0, 0.0, 100.0, 100.0);
        let other_clip = Rect::new(0.0, 0.0, 50.0, 50.0);
        let r = Rect::new(1.0, 1.0, 4.0, 4.0);
        let mut b = QuadBatcher::default();
        b.push(Quad::solid(r, [1.0; 4]), None, clip);
        b.push(Quad::solid(r, [0.5; 4]), None, clip);
        b.push(Quad::textured(r, [1.0; 4]), image(3), clip);
        b.push(Quad::textured(r, [1.0; 4]), image(3), other_clip);
        b.push(Quad::textured(r, [1.0; 4]), image(4), other_clip);

        assert_eq!(b.vertices.len(), 30);
        let ranges: Vec<_> = b.batches.iter().map(|x| x.vertices.clone()).collect();
        assert_eq!(ranges, vec![0..12, 12..18, 18..24, 24..30]);
    }

    #[test]
    fn degenerate_quads_are_skipped() {
        let mut b = QuadBatcher::default();
        b.push(
            Quad::solid(Rect::new(0.0, 0.0, 0.0, 5.0), [1.0; 4]),
            None,
            Rect::new(0.0, 0.0, 10.0, 10.0),
        );
        assert!(b.vertices.is_empty());
        assert!(b.batches.is_empty());
    }

    #[test]
    fn scissor_is_clamped_to_the_surface() {
        assert_eq!(
            scissor(&Rect::new(-10.0, 5.5, 50.0, 1000.0), 30, 20),
            Some((0, 5, 30, 15))
        );
        assert_eq!(scissor(&Rect::new(40.0, 0.0, 5.0, 5.0), 30, 20), None);
    }

    #[test]
    fn linear_conversion_keeps_endpoints_and_alpha() {
        assert_eq!(linear_color([0.0, 1.0, 0.0, 0.5]), [0.0, 1.0, 0.0, 0.5]);
        assert!(srgb_to_linear(0.5) < 0.5);
    }
}
