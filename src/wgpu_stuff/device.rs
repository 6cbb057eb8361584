//! `wgpu` backing for [`GpuDevice`]: the shared buffers and the physics
//! pipelines that run over them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::gpu::{BufferSlot, GpuDevice, ResourceLayout};
use crate::physics::PhysicsConstants;
use crate::scene::SubSceneId;
use crate::wgpu_stuff::shaders;
use crate::wgpu_stuff::timer::GpuTimer;

/// Buffers shared by the physics and render passes.
pub struct SceneBuffers {
    pub scene: wgpu::Buffer,
    pub draw_args: Vec<wgpu::Buffer>,
    pub body_states: [wgpu::Buffer; 2],
    pub settings: wgpu::Buffer,
}

struct PhysicsPipelines {
    integrate_velocity: wgpu::ComputePipeline,
    integrate_position: wgpu::ComputePipeline,
    /// Indexed by the half read from.
    bind_groups: [wgpu::BindGroup; 2],
}

pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    constants: PhysicsConstants,
    buffers: Option<SceneBuffers>,
    physics: Option<PhysicsPipelines>,
    pub timer: GpuTimer,
}

impl WgpuDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, constants: PhysicsConstants) -> Self {
        let timer = GpuTimer::new(&device, &queue, "Physics");

        Self {
            device,
            queue,
            constants,
            buffers: None,
            physics: None,
            timer,
        }
    }

    pub fn buffers(&self) -> Option<&SceneBuffers> {
        self.buffers.as_ref()
    }

    pub fn device(&self) -> Arc<wgpu::Device> {
        self.device.clone()
    }

    fn buffer(&self, slot: BufferSlot) -> Option<&wgpu::Buffer> {
        let buffers = self.buffers.as_ref()?;

        match slot {
            BufferSlot::Scene => Some(&buffers.scene),
            BufferSlot::DrawArgs(SubSceneId(index)) => buffers.draw_args.get(index),
            BufferSlot::BodyStates(half) => buffers.body_states.get(half),
            BufferSlot::PhysicsSettings => Some(&buffers.settings),
        }
    }

    fn create_buffers(&self, layout: &ResourceLayout) -> SceneBuffers {
        let storage = |label: &str, size: u64| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size.max(16),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let draw_args = (0..layout.sub_scenes)
            .map(|index| {
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Draw Args {index}")),
                    size: crate::scene::DrawArgs::BYTE_LENGTH,
                    usage: wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        SceneBuffers {
            scene: storage("Scene", layout.scene_bytes),
            draw_args,
            body_states: [
                storage("Body States A", layout.body_state_bytes),
                storage("Body States B", layout.body_state_bytes),
            ],
            settings: self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Physics Settings"),
                size: layout.settings_bytes,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        }
    }

    fn create_physics(&self, buffers: &SceneBuffers, first_body_object: u32) -> PhysicsPipelines {
        let device = &self.device;
        let shader = shaders::module(device, "Physics Shader", shaders::PHYSICS);

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Physics Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(buffers.settings.size()),
                    },
                    count: None,
                },
                storage_entry(1, false),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Physics Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let constants = HashMap::from([
            ("G".to_owned(), self.constants.gravitational_constant as f64),
            ("SOFTENING".to_owned(), self.constants.softening as f64),
            ("FIRST_BODY_OBJECT".to_owned(), first_body_object as f64),
        ]);

        let pipeline = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    ..Default::default()
                },
                cache: None,
            })
        };

        let bind_group = |read: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("Physics Bind Group (read {read})")),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers.settings.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffers.scene.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffers.body_states[read].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: buffers.body_states[1 - read].as_entire_binding(),
                    },
                ],
            })
        };

        PhysicsPipelines {
            integrate_velocity: pipeline("integrate_velocity"),
            integrate_position: pipeline("integrate_position"),
            bind_groups: [bind_group(0), bind_group(1)],
        }
    }
}

impl GpuDevice for WgpuDevice {
    fn allocate(&mut self, layout: &ResourceLayout) {
        if self.buffers.is_some() {
            log::warn!("Device resources already allocated");
            return;
        }

        let buffers = self.create_buffers(layout);
        self.physics = Some(self.create_physics(&buffers, layout.first_body_object));
        self.buffers = Some(buffers);

        log::info!(
            "Allocated {} bytes of scene records and 2x{} bytes of body state",
            layout.scene_bytes,
            layout.body_state_bytes
        );
    }

    fn write_buffer(&mut self, slot: BufferSlot, offset: u64, data: &[u8]) {
        let Some(buffer) = self.buffer(slot) else {
            log::warn!("Write to unallocated buffer {slot:?} ignored");
            return;
        };

        if offset + data.len() as u64 > buffer.size() {
            log::warn!(
                "Write of {} bytes at {} overruns {:?} ({} bytes), ignored",
                data.len(),
                offset,
                slot,
                buffer.size()
            );
            return;
        }

        self.queue.write_buffer(buffer, offset, data);
    }

    fn dispatch_physics(&mut self, read_half: usize, workgroups: u32) {
        let Some(physics) = &self.physics else {
            return;
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Physics Encoder"),
        });

        self.timer.start();
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Physics Pass"),
                timestamp_writes: self.timer.compute_timestamp_writes(),
            });

            pass.set_bind_group(0, &physics.bind_groups[read_half], &[]);
            pass.set_pipeline(&physics.integrate_velocity);
            pass.dispatch_workgroups(workgroups, 1, 1);
            pass.set_pipeline(&physics.integrate_position);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        self.timer.submit_and_record_timing(&self.queue, encoder);
    }
}
