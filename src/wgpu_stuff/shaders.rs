//! WGSL sources. The body shader is assembled from a shared part and one
//! material source, so an adapter without cube array support never sees a
//! cube array binding.

use std::borrow::Cow;

pub const PHYSICS: &str = include_str!("shaders/physics.wgsl");
pub const SKYBOX: &str = include_str!("shaders/skybox.wgsl");
pub const BODIES_CUBE_ARRAY: &str = concat!(
    include_str!("shaders/render.wgsl"),
    include_str!("shaders/render_cube_array.wgsl")
);
pub const BODIES_ATLAS: &str = concat!(
    include_str!("shaders/render.wgsl"),
    include_str!("shaders/render_atlas.wgsl")
);

pub fn module(device: &wgpu::Device, label: &str, source: &'static str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    })
}

#[cfg(test)]
pub mod validation {
    use wgpu::naga;

    /// Parses and validates `source` as a device with `capabilities` would.
    pub fn validate(source: &str, capabilities: naga::valid::Capabilities) -> Result<naga::Module, String> {
        let module = naga::front::wgsl::parse_str(source).map_err(|err| err.emit_to_string(source))?;
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), capabilities)
            .validate(&module)
            .map_err(|err| format!("{err:?}"))?;

        Ok(module)
    }
}
