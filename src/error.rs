use std::path::PathBuf;

/// Anything that stops the simulation from starting.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("No suitable graphics adapter found")]
    NoAdapter,
    #[error("Failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("Failed to request device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("Adapter lacks required capabilities: {0}")]
    MissingCapability(String),
    #[error("Surface is not supported by the adapter")]
    UnsupportedSurface,
    #[error("Texture atlas of {columns}x{rows} {width}x{height} images exceeds the {max_dimension} pixel limit")]
    AtlasTooLarge {
        columns: u32,
        rows: u32,
        width: u32,
        height: u32,
        max_dimension: u32,
    },
    #[error("Cube map faces must be square, found {width}x{height}")]
    NonSquareFaces { width: u32, height: u32 },
    #[error("Cube map needs a multiple of 6 faces, found {0}")]
    IncompleteCube(u32),
    #[error("{layers} texture layers exceed the device limit of {max}")]
    TooManyLayers { layers: u32, max: u32 },
    #[error("{size} pixel textures exceed the device limit of {max}")]
    TextureTooLarge { size: u32, max: u32 },
    #[error("GPU rejected {stage}: {message}")]
    Validation { stage: &'static str, message: String },
    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Scene buffer cannot hold a sub-scene of {0} objects")]
    SceneLayout(u32),
    #[error("Simulation buffers were not allocated")]
    Unallocated,
}

pub type InitResult<T> = Result<T, InitError>;
