use winit::event::{ElementState, KeyEvent};
use winit::keyboard::PhysicalKey;

use crate::camera::{Camera, KeyboardState};
use crate::config::{ControlChange, RuntimeControls, SimConfig};
use crate::error::{InitError, InitResult};
use crate::simulation::NBodySimulation;
use crate::wgpu_stuff::assets::AssetLoader;
use crate::wgpu_stuff::device::WgpuDevice;
use crate::wgpu_stuff::framework::{validated, App, GpuContext};
use crate::wgpu_stuff::mesh::{Mesh, MeshData};
use crate::wgpu_stuff::renderer::{Materials, Renderer};
use crate::wgpu_stuff::texture::{TextureArray, TextureAtlas};
use crate::wgpu_stuff::timer::frames_per_second;
use crate::wgpu_stuff::ui::{FrameStats, UiAdapter};

const SPHERE_RESOLUTION: u32 = 9;

pub struct Sim {
    simulation: NBodySimulation,
    gpu: WgpuDevice,
    renderer: Renderer,
    camera: Camera,
    keys: KeyboardState,
    controls: RuntimeControls,
    ui: Box<dyn UiAdapter>,
}

impl Sim {
    fn apply(&mut self, change: ControlChange) {
        match change {
            ControlChange::BodyCount(count) => {
                self.simulation.set_population(count, &mut self.gpu);
                // spawning can fall short of the target when space runs out
                self.controls.body_count = self.simulation.body_count() as u32;
            }
            ControlChange::Restitution(restitution) => self.simulation.set_restitution(restitution),
        }

        log::info!(
            "{} bodies, restitution {:.1}",
            self.simulation.body_count(),
            self.simulation.restitution()
        );
        self.ui.show_controls(&self.controls);
    }

    fn load_materials(context: &GpuContext, loader: &mut AssetLoader) -> InitResult<Materials> {
        let faces = loader.materials()?;
        let cube_arrays = context
            .adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::CUBE_ARRAY_TEXTURES);

        if cube_arrays {
            Ok(Materials::CubeArray(TextureArray::cube_array(
                &context.device,
                &context.queue,
                "Body Materials",
                &faces,
            )?))
        } else {
            log::warn!("Cube array textures unsupported, packing materials into an atlas");
            Ok(Materials::Atlas(TextureAtlas::new(
                &context.device,
                &context.queue,
                "Body Material Atlas",
                &faces,
            )?))
        }
    }
}

impl App for Sim {
    fn optional_features() -> wgpu::Features {
        wgpu::Features::TIMESTAMP_QUERY
    }

    fn init(context: &GpuContext, config: &SimConfig, mut ui: Box<dyn UiAdapter>) -> InitResult<Self> {
        let device = &context.device;
        let mut loader = AssetLoader::new(&config.assets, config.rng());
        let materials = validated(device, "material textures", || Self::load_materials(context, &mut loader))??;
        let skybox = loader.skybox()?;
        let skybox = validated(device, "skybox texture", || {
            TextureArray::cube(device, &context.queue, "Skybox", &skybox)
        })??;

        let controls = RuntimeControls::new(config);
        let sphere = MeshData::sphere(SPHERE_RESOLUTION, 1.0);

        let mut simulation = NBodySimulation::new(
            config.spawn_settings(materials.count()),
            config.rng(),
            controls.body_count,
            controls.restitution,
            sphere.index_count(),
        );
        let mut gpu = WgpuDevice::new(device.clone(), context.queue.clone(), config.physics_constants());
        validated(device, "physics pipelines", || simulation.initialise(&mut gpu))??;

        let buffers = gpu.buffers().ok_or(InitError::Unallocated)?;
        let mut renderer = validated(device, "render pipelines", || {
            Renderer::new(
                device,
                &context.queue,
                &context.surface_config,
                buffers,
                simulation.pool(),
                Mesh::new(device, "Body Sphere", &sphere),
                materials,
            )
        })?;
        renderer.set_skybox(device, skybox);

        let aspect_ratio = context.surface_config.width as f32 / context.surface_config.height.max(1) as f32;
        let camera = Camera::new(config.camera_settings(aspect_ratio));

        log::info!(
            "Started with {} bodies and {} materials",
            simulation.body_count(),
            renderer.material_count()
        );
        ui.show_controls(&controls);

        Ok(Self {
            simulation,
            gpu,
            renderer,
            camera,
            keys: KeyboardState::default(),
            controls,
            ui,
        })
    }

    fn resize(&mut self, config: &wgpu::SurfaceConfiguration, device: &wgpu::Device, _queue: &wgpu::Queue) {
        self.renderer.resize(device, config);
        self.camera.aspect_ratio = config.width as f32 / config.height.max(1) as f32;
    }

    fn key_event(&mut self, event: &KeyEvent) {
        self.keys.handle_key_event(event);

        if event.state != ElementState::Pressed {
            return;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };

        if let Some(change) = self.controls.handle_key(code) {
            self.apply(change);
        }
    }

    fn pointer_motion(&mut self, dx: f64, dy: f64) {
        self.camera.handle_pointer_motion(dx as f32, dy as f32);
    }

    fn focus_lost(&mut self) {
        self.keys.clear();
    }

    fn update(&mut self, delta_time_ms: f32) {
        self.camera.check_keyboard_inputs(&self.keys, delta_time_ms);
        self.simulation.tick(delta_time_ms, &mut self.gpu);

        let device = self.gpu.device();
        self.gpu.timer.poll(&device);
        self.renderer.timer.poll(&device);

        self.ui.show_stats(FrameStats {
            physics: self.gpu.timer.display(),
            render: self.renderer.timer.display(),
            fps: self.renderer.timer.average_nanoseconds().map(frames_per_second),
        });
    }

    fn render(&mut self, view: &wgpu::TextureView, device: &wgpu::Device, queue: &wgpu::Queue) {
        let Some(buffers) = self.gpu.buffers() else {
            return;
        };

        self.renderer
            .render(view, device, queue, &self.camera, self.simulation.pool(), buffers);
    }
}
