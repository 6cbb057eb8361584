//! Texture assets on disk.
//!
//! Layout under the asset root:
//!
//! ```text
//! skybox/{px,nx,py,ny,pz,nz}.png
//! bodies/<material>/{px,nx,py,ny,pz,nz}.png
//! ```
//!
//! Images decode on worker threads. Anything missing is replaced by
//! generated faces so the simulation can start without assets.

use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};

use crate::error::{InitError, InitResult};

pub const CUBE_FACE_NAMES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

const GENERATED_FACE_SIZE: u32 = 256;
const GENERATED_MATERIALS: u32 = 4;

/// Equally sized RGBA images in a fixed order.
#[derive(Debug, Clone)]
pub struct ImageSet {
    pub width: u32,
    pub height: u32,
    pub images: Vec<RgbaImage>,
}

impl ImageSet {
    pub fn len(&self) -> usize {
        self.images.len()
    }
}

pub struct AssetLoader {
    root: PathBuf,
    rng: fastrand::Rng,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>, rng: fastrand::Rng) -> Self {
        Self {
            root: root.into(),
            rng,
        }
    }

    pub fn skybox(&mut self) -> InitResult<ImageSet> {
        let dir = self.root.join("skybox");

        match cube_face_paths(&dir) {
            Some(paths) => decode_all(paths),
            None => {
                log::warn!("No skybox at {}, generating a starfield", dir.display());
                Ok(generated_skybox(GENERATED_FACE_SIZE, &mut self.rng))
            }
        }
    }

    /// Six faces per material, materials in directory name order.
    pub fn materials(&mut self) -> InitResult<ImageSet> {
        let dir = self.root.join("bodies");
        let mut material_dirs: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| path.is_dir())
                    .collect()
            })
            .unwrap_or_default();
        material_dirs.sort();

        let paths: Vec<PathBuf> = material_dirs
            .iter()
            .filter_map(|dir| {
                let faces = cube_face_paths(dir);
                if faces.is_none() {
                    log::warn!("Skipping {}, missing cube faces", dir.display());
                }
                faces
            })
            .flatten()
            .collect();

        if paths.is_empty() {
            log::warn!("No body materials in {}, generating {GENERATED_MATERIALS}", dir.display());
            return Ok(generated_materials(GENERATED_MATERIALS, GENERATED_FACE_SIZE, &mut self.rng));
        }

        decode_all(paths)
    }
}

/// The six face paths of a cube map directory, if all exist.
fn cube_face_paths(dir: &Path) -> Option<Vec<PathBuf>> {
    CUBE_FACE_NAMES
        .iter()
        .map(|name| dir.join(format!("{name}.png")))
        .map(|path| path.is_file().then_some(path))
        .collect()
}

/// Decodes every path on its own thread and returns the images in path
/// order. Images whose size differs from the first are resized to match.
pub fn decode_all(paths: Vec<PathBuf>) -> InitResult<ImageSet> {
    let (tx, rx) = flume::unbounded();

    for (index, path) in paths.iter().cloned().enumerate() {
        let tx = tx.clone();
        std::thread::spawn(move || {
            let decoded = image::open(&path).map(|image| image.to_rgba8());
            // receiver outlives every sender
            let _ = tx.send((index, path, decoded));
        });
    }
    drop(tx);

    let mut slots: Vec<Option<RgbaImage>> = vec![None; paths.len()];
    for (index, path, decoded) in rx.iter() {
        let image = decoded.map_err(|source| InitError::Decode { path, source })?;
        slots[index] = Some(image);
    }

    let mut images: Vec<RgbaImage> = slots.into_iter().flatten().collect();
    let Some((width, height)) = images.first().map(RgbaImage::dimensions) else {
        return Ok(ImageSet {
            width: 0,
            height: 0,
            images,
        });
    };

    for (image, path) in images.iter_mut().zip(&paths) {
        if image.dimensions() != (width, height) {
            log::warn!(
                "{} is {:?}, resizing to {}x{}",
                path.display(),
                image.dimensions(),
                width,
                height
            );
            *image = image::imageops::resize(image, width, height, image::imageops::FilterType::Triangle);
        }
    }

    log::info!("Loaded {} images of {}x{}", images.len(), width, height);
    Ok(ImageSet { width, height, images })
}

/// Sparse white stars on near-black.
pub fn generated_skybox(size: u32, rng: &mut fastrand::Rng) -> ImageSet {
    let images = CUBE_FACE_NAMES
        .iter()
        .map(|_| {
            RgbaImage::from_fn(size, size, |_, _| {
                if rng.f32() < 0.002 {
                    let brightness = 160 + rng.u8(..96);
                    Rgba([brightness, brightness, brightness, 255])
                } else {
                    Rgba([2, 2, 8, 255])
                }
            })
        })
        .collect();

    ImageSet {
        width: size,
        height: size,
        images,
    }
}

/// Banded noise in a different shade per material.
pub fn generated_materials(count: u32, size: u32, rng: &mut fastrand::Rng) -> ImageSet {
    let mut images = Vec::with_capacity(count as usize * CUBE_FACE_NAMES.len());

    for material in 0..count {
        let tint = (material as f32 + 0.5) / count.max(1) as f32;
        let bands = 4 + material * 3;

        for _ in CUBE_FACE_NAMES {
            images.push(RgbaImage::from_fn(size, size, |_, y| {
                let band = ((y * bands / size.max(1)) % 2) as f32;
                let shade = 0.6 + 0.25 * band + 0.15 * rng.f32();
                Rgba([
                    (255.0 * shade) as u8,
                    (255.0 * shade * (0.6 + 0.4 * tint)) as u8,
                    (255.0 * shade * (1.0 - 0.4 * tint)) as u8,
                    255,
                ])
            }));
        }
    }

    ImageSet {
        width: size,
        height: size,
        images,
    }
}
