//! Render step: skybox, then one indirect draw per populated sub-scene.

use std::collections::HashMap;

use bytemuck::{AnyBitPattern, NoUninit};

use crate::camera::Camera;
use crate::math;
use crate::scene::ScenePool;
use crate::wgpu_stuff::device::SceneBuffers;
use crate::wgpu_stuff::mesh::{Mesh, Vertex};
use crate::wgpu_stuff::shaders;
use crate::wgpu_stuff::skybox::SkyboxRenderer;
use crate::wgpu_stuff::texture::{TextureArray, TextureAtlas};
use crate::wgpu_stuff::timer::GpuTimer;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

#[derive(Clone, Copy, Debug, PartialEq, NoUninit, AnyBitPattern)]
#[repr(C)]
pub struct CameraUniform {
    pub perspective_view: [[f32; 4]; 4],
    pub inverse_perspective_view: [[f32; 4]; 4],
    pub position: [f32; 4],
}

impl CameraUniform {
    pub fn new(camera: &Camera) -> Self {
        let perspective_view = camera.perspective_view_matrix();

        Self {
            perspective_view: math::to_columns(&perspective_view),
            inverse_perspective_view: math::to_columns(&perspective_view.inversed()),
            position: [camera.position.x, camera.position.y, camera.position.z, 1.0],
        }
    }
}

/// Per-sub-scene block read through a dynamic offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, NoUninit, AnyBitPattern)]
#[repr(C)]
struct SubSceneParams {
    first_object: u32,
    _padding: [u32; 3],
}

/// Distance between consecutive sub-scene blocks.
pub fn sub_scene_stride(min_uniform_offset_alignment: u32) -> u64 {
    math::round_up(
        std::mem::size_of::<SubSceneParams>() as u64,
        min_uniform_offset_alignment.max(1) as u64,
    )
}

/// Body material textures, as cube maps when the adapter can sample cube
/// arrays and as a face atlas otherwise.
pub enum Materials {
    CubeArray(TextureArray),
    Atlas(TextureAtlas),
}

impl Materials {
    pub fn count(&self) -> u32 {
        match self {
            Self::CubeArray(array) => array.layers,
            Self::Atlas(atlas) => atlas.count / crate::wgpu_stuff::texture::CUBE_FACES,
        }
    }

    fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        let view_dimension = match self {
            Self::CubeArray(_) => wgpu::TextureViewDimension::CubeArray,
            Self::Atlas(_) => wgpu::TextureViewDimension::D2,
        };

        wgpu::BindGroupLayoutEntry {
            binding: 3,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension,
                multisampled: false,
            },
            count: None,
        }
    }

    fn bind_group_entry(&self) -> wgpu::BindGroupEntry<'_> {
        let view = match self {
            Self::CubeArray(array) => array.view(),
            Self::Atlas(atlas) => atlas.view(),
        };

        wgpu::BindGroupEntry {
            binding: 3,
            resource: wgpu::BindingResource::TextureView(view),
        }
    }

    fn shader_source(&self) -> &'static str {
        match self {
            Self::CubeArray(_) => shaders::BODIES_CUBE_ARRAY,
            Self::Atlas(_) => shaders::BODIES_ATLAS,
        }
    }

    fn constants(&self) -> HashMap<String, f64> {
        match self {
            Self::CubeArray(_) => HashMap::new(),
            Self::Atlas(atlas) => HashMap::from([
                ("ATLAS_COLUMNS".to_owned(), atlas.layout.columns as f64),
                ("ATLAS_ROWS".to_owned(), atlas.layout.rows as f64),
            ]),
        }
    }
}

struct DepthTexture {
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        }
    }
}

pub struct Renderer {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    camera_buffer: wgpu::Buffer,
    sub_scene_stride: u64,
    depth: DepthTexture,
    mesh: Mesh,
    skybox: SkyboxRenderer,
    materials: Materials,
    pub timer: GpuTimer,
}

impl Renderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &wgpu::SurfaceConfiguration,
        buffers: &SceneBuffers,
        pool: &ScenePool,
        mesh: Mesh,
        materials: Materials,
    ) -> Self {
        let shader = shaders::module(device, "Body Shader", materials.shader_source());

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniform"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sub_scene_stride = sub_scene_stride(device.limits().min_uniform_buffer_offset_alignment);
        let sub_scene_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sub-scene Parameters"),
            size: sub_scene_stride * pool.max_sub_scenes().max(1) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        for id in pool.sub_scenes() {
            let params = SubSceneParams {
                first_object: pool.first_object(id),
                ..Default::default()
            };
            queue.write_buffer(&sub_scene_buffer, id.0 as u64 * sub_scene_stride, bytemuck::bytes_of(&params));
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Body Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<SubSceneParams>() as u64),
                    },
                    count: None,
                },
                materials.layout_entry(),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Body Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.scene.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &sub_scene_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<SubSceneParams>() as u64),
                    }),
                },
                materials.bind_group_entry(),
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Body Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let constants = materials.constants();
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Body Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    ..Default::default()
                },
                targets: &[Some(config.format.into())],
            }),
            primitive: wgpu::PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        log::info!(
            "Renderer ready: {} materials, {} indices per body",
            materials.count(),
            mesh.index_count
        );

        Self {
            pipeline,
            bind_group,
            camera_buffer,
            sub_scene_stride,
            depth: DepthTexture::new(device, config),
            mesh,
            skybox: SkyboxRenderer::new(device, config.format),
            materials,
            timer: GpuTimer::new(device, queue, "Render"),
        }
    }

    pub fn material_count(&self) -> u32 {
        self.materials.count()
    }

    pub fn set_skybox(&mut self, device: &wgpu::Device, cube: TextureArray) {
        self.skybox.set_skybox(device, &self.camera_buffer, cube);
    }

    /// Recreates the depth attachment at the new surface size.
    pub fn resize(&mut self, device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) {
        self.depth = DepthTexture::new(device, config);
    }

    pub fn render(
        &mut self,
        view: &wgpu::TextureView,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        camera: &Camera,
        pool: &ScenePool,
        buffers: &SceneBuffers,
    ) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&CameraUniform::new(camera)));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        self.timer.start();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: self.timer.render_timestamp_writes(),
                occlusion_query_set: None,
            });

            self.skybox.render(&mut pass);

            pass.set_pipeline(&self.pipeline);
            self.mesh.bind(&mut pass);

            for id in pool.sub_scenes() {
                if pool.object_count(id) == 0 {
                    continue;
                }
                let Some(draw_args) = buffers.draw_args.get(id.0) else {
                    continue;
                };

                let offset = (id.0 as u64 * self.sub_scene_stride) as wgpu::DynamicOffset;
                pass.set_bind_group(0, &self.bind_group, &[offset]);
                pass.draw_indexed_indirect(draw_args, 0);
            }
        }

        self.timer.submit_and_record_timing(queue, encoder);
    }
}
