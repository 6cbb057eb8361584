//! Window, surface and device setup plus the event loop that drives an
//! [`App`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{DeviceEvent, ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowBuilder};

use crate::config::SimConfig;
use crate::error::{InitError, InitResult};
use crate::wgpu_stuff::ui::{UiAdapter, WindowTitleUi};

/// Frame deltas above this are treated as a stall and clamped.
pub const WORMHOLE_THRESHOLD: Duration = Duration::from_millis(100);

/// Measures the time between frames.
#[derive(Debug)]
pub struct FrameClock {
    last: Option<Instant>,
    threshold: Duration,
}

impl FrameClock {
    pub fn new(threshold: Duration) -> Self {
        Self { last: None, threshold }
    }

    /// Milliseconds since the previous tick, zero on the first one.
    pub fn tick(&mut self, now: Instant) -> f32 {
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last = Some(now);

        if delta > self.threshold {
            log::debug!("Frame took {delta:?}, clamping to {:?}", self.threshold);
        }
        delta.min(self.threshold).as_secs_f32() * 1000.0
    }
}

pub trait App: Sized + 'static {
    fn optional_features() -> wgpu::Features {
        wgpu::Features::empty()
    }

    fn required_downlevel_capabilities() -> wgpu::DownlevelCapabilities {
        wgpu::DownlevelCapabilities {
            flags: wgpu::DownlevelFlags::COMPUTE_SHADERS
                | wgpu::DownlevelFlags::VERTEX_STORAGE
                | wgpu::DownlevelFlags::INDIRECT_EXECUTION,
            ..Default::default()
        }
    }

    fn init(context: &GpuContext, config: &SimConfig, ui: Box<dyn UiAdapter>) -> InitResult<Self>;

    fn resize(&mut self, config: &wgpu::SurfaceConfiguration, device: &wgpu::Device, queue: &wgpu::Queue);

    fn key_event(&mut self, event: &KeyEvent);

    fn pointer_motion(&mut self, dx: f64, dy: f64);

    fn focus_lost(&mut self);

    fn update(&mut self, delta_time_ms: f32);

    fn render(&mut self, view: &wgpu::TextureView, device: &wgpu::Device, queue: &wgpu::Queue);
}

pub struct GpuContext {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    async fn new<A: App>(window: Arc<Window>, vsync: bool) -> InitResult<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(InitError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using {} ({:?})", info.name, info.backend);

        let required = A::required_downlevel_capabilities();
        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(required.flags) {
            return Err(InitError::MissingCapability(format!(
                "{:?}",
                required.flags - downlevel.flags
            )));
        }

        let optional = A::optional_features();
        let available = adapter.features();
        let missing = optional - available;
        if !missing.is_empty() {
            log::warn!("Optional features unavailable: {missing:?}");
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: optional & available,
                    required_limits: required_limits(&adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let size = window.inner_size();
        let mut surface_config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or(InitError::UnsupportedSurface)?;
        surface_config.present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        surface.configure(&device, &surface_config);

        Ok(Self {
            window,
            surface,
            surface_config,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Returns false for a zero-sized window, which leaves the surface as is.
    fn resize(&mut self, size: PhysicalSize<u32>) -> bool {
        if size.width == 0 || size.height == 0 {
            return false;
        }

        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.reconfigure();
        true
    }

    fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.surface_config);
    }
}

/// Downlevel baseline raised to the adapter's texture sizes and alignments,
/// so GL-class adapters are accepted.
pub fn required_limits(adapter: &wgpu::Limits) -> wgpu::Limits {
    wgpu::Limits::downlevel_defaults()
        .using_resolution(adapter.clone())
        .using_alignment(adapter.clone())
}

/// Runs `build` inside a validation error scope, turning GPU-side
/// rejections into [`InitError::Validation`].
pub fn validated<T>(device: &wgpu::Device, stage: &'static str, build: impl FnOnce() -> T) -> InitResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();

    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(InitError::Validation {
            stage,
            message: err.to_string(),
        }),
        None => Ok(value),
    }
}

/// Grabs or releases the pointer, returning whether it ended up captured.
fn set_pointer_capture(window: &Window, capture: bool) -> bool {
    if !capture {
        if let Err(err) = window.set_cursor_grab(CursorGrabMode::None) {
            log::warn!("Could not release pointer: {err}");
        }
        window.set_cursor_visible(true);
        return false;
    }

    let grabbed = window
        .set_cursor_grab(CursorGrabMode::Locked)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));

    match grabbed {
        Ok(()) => {
            window.set_cursor_visible(false);
            true
        }
        Err(err) => {
            log::warn!("Could not capture pointer: {err}");
            false
        }
    }
}

pub fn run<A: App>(title: &str, config: SimConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(title)
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)?,
    );

    let mut context = pollster::block_on(GpuContext::new::<A>(window.clone(), !config.no_vsync))?;
    let ui = Box::new(WindowTitleUi::new(window, title));
    let mut app = A::init(&context, &config, ui)?;

    let mut clock = FrameClock::new(WORMHOLE_THRESHOLD);
    let mut pointer_captured = false;

    event_loop.run(move |event, target| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => target.exit(),
            WindowEvent::Resized(size) => {
                if context.resize(size) {
                    app.resize(&context.surface_config, &context.device, &context.queue);
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } if !pointer_captured => {
                pointer_captured = set_pointer_capture(&context.window, true);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let escape = event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape);
                if escape && pointer_captured {
                    pointer_captured = set_pointer_capture(&context.window, false);
                }

                app.key_event(&event);
            }
            WindowEvent::Focused(false) => {
                if pointer_captured {
                    pointer_captured = set_pointer_capture(&context.window, false);
                }
                app.focus_lost();
            }
            WindowEvent::RedrawRequested => {
                app.update(clock.tick(Instant::now()));

                let frame = match context.surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                        context.reconfigure();
                        return;
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of memory acquiring a frame, exiting");
                        target.exit();
                        return;
                    }
                    Err(err) => {
                        log::warn!("Skipping frame: {err}");
                        return;
                    }
                };

                let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                app.render(&view, &context.device, &context.queue);
                frame.present();
            }
            _ => {}
        },
        Event::DeviceEvent {
            event: DeviceEvent::MouseMotion { delta: (dx, dy) },
            ..
        } if pointer_captured => app.pointer_motion(dx, dy),
        Event::AboutToWait => context.window.request_redraw(),
        _ => {}
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_fit_a_downlevel_adapter() {
        let adapter = wgpu::Limits {
            max_texture_dimension_2d: 4096,
            min_uniform_buffer_offset_alignment: 64,
            ..wgpu::Limits::downlevel_webgl2_defaults()
        };
        let limits = required_limits(&adapter);

        assert_eq!(limits.max_texture_dimension_2d, 4096);
        assert_eq!(limits.min_uniform_buffer_offset_alignment, 64);
        assert!(limits.max_storage_buffers_per_shader_stage >= 3);
        assert!(limits.max_compute_invocations_per_workgroup >= crate::physics::WORKGROUP_SIZE);
    }

    #[test]
    fn first_tick_is_zero() {
        let mut clock = FrameClock::new(WORMHOLE_THRESHOLD);
        assert_eq!(clock.tick(Instant::now()), 0.0);
    }

    #[test]
    fn tick_reports_elapsed_milliseconds() {
        let start = Instant::now();
        let mut clock = FrameClock::new(WORMHOLE_THRESHOLD);
        clock.tick(start);

        let delta = clock.tick(start + Duration::from_millis(16));
        approx::assert_relative_eq!(delta, 16.0, epsilon = 1e-3);
    }

    #[test]
    fn stalls_are_clamped() {
        let start = Instant::now();
        let mut clock = FrameClock::new(WORMHOLE_THRESHOLD);
        clock.tick(start);

        let delta = clock.tick(start + Duration::from_secs(3));
        approx::assert_relative_eq!(delta, 100.0, epsilon = 1e-3);
    }
}
