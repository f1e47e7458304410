use crate::camera::OrbitCamera;
use crate::error::{ImagingError, Result};
use crate::raycast::{ALPHA_SCALE, MAX_STEPS, RayCastSettings};
use crate::volume::VolumeBuffer;

use glam::Mat4;
use image::RgbaImage;
use log::{debug, info};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use web_time::Instant;
use wgpu::{PollType, util::DeviceExt};

pub struct WGPU {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl WGPU {
    /// Requests a device on the best available adapter, without a surface.
    pub async fn request() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| ImagingError::Gpu(err.to_string()))?;
        info!("using GPU adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Volume Ray-Caster Device"),
                ..Default::default()
            })
            .await
            .map_err(|err| ImagingError::Gpu(err.to_string()))?;
        Ok(Self { device, queue })
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    model_inverse: [[f32; 4]; 4],
    camera_position: [f32; 4],
    params: [f32; 4],
}

impl FrameUniforms {
    fn new(camera: &OrbitCamera, model: &Mat4, settings: &RayCastSettings, aspect: f32) -> Self {
        Self {
            view_proj: camera.view_projection(aspect).to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            model_inverse: model.inverse().to_cols_array_2d(),
            camera_position: camera.eye().extend(1.0).to_array(),
            params: [
                settings.threshold,
                settings.opacity,
                settings.step_count.clamp(1, MAX_STEPS) as f32,
                ALPHA_SCALE,
            ],
        }
    }
}

#[rustfmt::skip]
const CUBE_VERTICES: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5],
    [-0.5, -0.5,  0.5], [0.5, -0.5,  0.5], [0.5, 0.5,  0.5], [-0.5, 0.5,  0.5],
];

// Counter-clockwise seen from outside
#[rustfmt::skip]
const CUBE_INDICES: [u16; 36] = [
    4, 5, 6, 4, 6, 7, // +z
    1, 0, 3, 1, 3, 2, // -z
    5, 1, 2, 5, 2, 6, // +x
    0, 4, 7, 0, 7, 3, // -x
    7, 6, 2, 7, 2, 3, // +y
    0, 1, 5, 0, 5, 4, // -y
];

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

/// A volume resident on the GPU. The allocation is released on drop.
struct VolumeTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    source: Arc<VolumeBuffer>,
}

impl Drop for VolumeTexture {
    fn drop(&mut self) {
        debug!("releasing volume texture {:?}", self.source.dim());
        self.texture.destroy();
    }
}

/// Renders a [`VolumeBuffer`] by ray-marching the back faces of its bounding box.
pub struct VolumeRayCaster {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    target_format: wgpu::TextureFormat,
    volume: Option<VolumeTexture>,
    /// Object transform of the volume box
    pub model: Mat4,
    last_frame: Option<Instant>,
    frame_time: Duration,
}

impl VolumeRayCaster {
    pub fn new(wgpu: WGPU, target_format: wgpu::TextureFormat) -> Self {
        let WGPU { device, queue } = wgpu;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Volume Ray-Cast Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "shaders/volume_raycast.wgsl"
            ))),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volume Ray-Cast Bind Group Layout"),
            entries: &[
                // 3D texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Frame uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Volume Ray-Cast Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Volume Ray-Cast Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                // Back faces only, so rays still start when the camera is inside the box
                cull_mode: Some(wgpu::Face::Front),
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cube Vertex Buffer"),
            contents: bytemuck::cast_slice(&CUBE_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cube Index Buffer"),
            contents: bytemuck::cast_slice(&CUBE_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            vertex_buffer,
            index_buffer,
            target_format,
            volume: None,
            model: Mat4::IDENTITY,
            last_frame: None,
            frame_time: Duration::ZERO,
        }
    }

    /// Headless ray-caster rendering into RGBA8 frames.
    pub async fn headless() -> Result<Self> {
        Ok(Self::new(WGPU::request().await?, wgpu::TextureFormat::Rgba8Unorm))
    }

    /// Makes `volume` the rendered buffer. A different buffer, or `None`,
    /// releases the previous texture first. Returns whether anything changed.
    pub fn sync(&mut self, volume: Option<&Arc<VolumeBuffer>>) -> bool {
        let unchanged = match (&self.volume, volume) {
            (Some(current), Some(next)) => Arc::ptr_eq(&current.source, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return false;
        }
        self.volume = None;
        if let Some(volume) = volume {
            self.volume = Some(self.upload(Arc::clone(volume)));
        }
        true
    }

    pub fn has_volume(&self) -> bool {
        self.volume.is_some()
    }

    /// Duration between the two most recent frames
    pub fn last_frame_time(&self) -> Duration {
        self.frame_time
    }

    fn upload(&self, source: Arc<VolumeBuffer>) -> VolumeTexture {
        let (depth, height, width) = source.dim();
        let (depth, height, width) = (depth as u32, height as u32, width as u32);
        info!("uploading {width}x{height}x{depth} volume texture");

        // Create 3D texture
        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        // Upload volume data
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            source.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            texture_size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Ray-Cast Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        VolumeTexture {
            texture,
            bind_group,
            source,
        }
    }

    /// Per-frame update: pushes the current camera pose, model inverse and transfer
    /// settings, then draws into `target`. Without a volume the target is only cleared.
    pub fn frame(
        &mut self,
        camera: &OrbitCamera,
        settings: &RayCastSettings,
        target: &wgpu::TextureView,
        size: (u32, u32),
    ) {
        let now = Instant::now();
        if let Some(previous) = self.last_frame.replace(now) {
            self.frame_time = now.duration_since(previous);
        }

        let aspect = size.0.max(1) as f32 / size.1.max(1) as f32;
        let uniforms = FrameUniforms::new(camera, &self.model, settings, aspect);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Volume Ray-Cast Encoder"),
            });
        self.encode(&mut encoder, target);
        self.queue.submit(Some(encoder.finish()));
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Volume Ray-Cast Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let Some(volume) = &self.volume else {
            return;
        };
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &volume.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..CUBE_INDICES.len() as u32, 0, 0..1);
    }

    /// Renders one frame offscreen and reads it back.
    pub async fn render_to_image(
        &mut self,
        camera: &OrbitCamera,
        settings: &RayCastSettings,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage> {
        if self.target_format != wgpu::TextureFormat::Rgba8Unorm {
            return Err(ImagingError::Gpu(format!(
                "readback needs an Rgba8Unorm target, ray-caster uses {:?}",
                self.target_format
            )));
        }
        if width == 0 || height == 0 {
            return Err(ImagingError::InvalidRequest(format!(
                "cannot render a {width}x{height} frame"
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let target = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        self.frame(camera, settings, &view, (width, height));

        let unpadded_row = width * 4;
        let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            size,
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|err| ImagingError::Gpu(err.to_string()))?;
        receiver
            .await
            .map_err(|_| ImagingError::Gpu("readback channel closed".into()))?
            .map_err(|err| ImagingError::Gpu(err.to_string()))?;

        let pixels = {
            let data = buffer_slice.get_mapped_range();
            data.chunks(padded_row as usize)
                .flat_map(|row| &row[..unpadded_row as usize])
                .copied()
                .collect::<Vec<u8>>()
        };
        staging_buffer.unmap();
        target.destroy();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| ImagingError::Gpu("readback size mismatch".into()))
    }
}
