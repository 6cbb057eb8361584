//! Immutable GPU image collections.
//!
//! [`GpuImage`] owns a texture and its view. [`TextureArray`] stacks cube
//! maps as array layers, [`TextureAtlas`] packs flat images into a grid.
//! Both are built once from an [`ImageSet`] and never modified.

use image::RgbaImage;

use crate::error::{InitError, InitResult};
use crate::wgpu_stuff::assets::ImageSet;

pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const CUBE_FACES: u32 = 6;

pub struct GpuImage {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl GpuImage {
    fn new(
        device: &wgpu::Device,
        label: &str,
        size: wgpu::Extent3d,
        view_dimension: wgpu::TextureViewDimension,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(view_dimension),
            ..Default::default()
        });

        Self { texture, view }
    }

    /// Copies one image to `(x, y)` of array layer `layer`.
    fn write(&self, queue: &wgpu::Queue, layer: u32, (x, y): (u32, u32), rgba: &RgbaImage) {
        let (width, height) = rgba.dimensions();
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            rgba.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Cube maps stacked as layers of one texture.
pub struct TextureArray {
    pub image: GpuImage,
    /// Number of cube maps, not raw array layers.
    pub layers: u32,
}

impl TextureArray {
    /// A single cube map. `faces` must hold exactly six images.
    pub fn cube(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, faces: &ImageSet) -> InitResult<Self> {
        if faces.len() != CUBE_FACES as usize {
            return Err(InitError::IncompleteCube(faces.len() as u32));
        }

        Self::with_view(device, queue, label, faces, wgpu::TextureViewDimension::Cube)
    }

    /// One cube map per six consecutive images of `faces`.
    pub fn cube_array(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, faces: &ImageSet) -> InitResult<Self> {
        Self::with_view(device, queue, label, faces, wgpu::TextureViewDimension::CubeArray)
    }

    fn with_view(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        faces: &ImageSet,
        view_dimension: wgpu::TextureViewDimension,
    ) -> InitResult<Self> {
        check_cube_faces(faces.width, faces.height, faces.len() as u32, &device.limits())?;

        let size = wgpu::Extent3d {
            width: faces.width,
            height: faces.height,
            depth_or_array_layers: faces.len() as u32,
        };
        let image = GpuImage::new(device, label, size, view_dimension);

        for (layer, face) in faces.images.iter().enumerate() {
            image.write(queue, layer as u32, (0, 0), face);
        }

        let layers = size.depth_or_array_layers / CUBE_FACES;
        log::debug!("{label}: {layers} cube layers of {}x{}", faces.width, faces.height);

        Ok(Self { image, layers })
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.image.view
    }
}

/// Rejects face sets the device cannot hold as cube map layers.
pub fn check_cube_faces(width: u32, height: u32, images: u32, limits: &wgpu::Limits) -> InitResult<()> {
    if width != height {
        return Err(InitError::NonSquareFaces { width, height });
    }
    if images == 0 || images % CUBE_FACES != 0 {
        return Err(InitError::IncompleteCube(images));
    }
    if width > limits.max_texture_dimension_2d {
        return Err(InitError::TextureTooLarge {
            size: width,
            max: limits.max_texture_dimension_2d,
        });
    }
    if images > limits.max_texture_array_layers {
        return Err(InitError::TooManyLayers {
            layers: images,
            max: limits.max_texture_array_layers,
        });
    }

    Ok(())
}

/// Where each image of an atlas lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    pub columns: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl AtlasLayout {
    /// Fits `count` images of `width`x`height` into as few rows as the
    /// dimension limit allows.
    pub fn new(count: u32, width: u32, height: u32, max_dimension: u32) -> InitResult<Self> {
        let count = count.max(1);
        let columns = (max_dimension / width.max(1)).min(count);
        let too_large = |columns: u32, rows: u32| InitError::AtlasTooLarge {
            columns,
            rows,
            width,
            height,
            max_dimension,
        };

        if columns == 0 {
            return Err(too_large(1, count));
        }

        let rows = count.div_ceil(columns);
        if rows as u64 * height as u64 > max_dimension as u64 {
            return Err(too_large(columns, rows));
        }

        Ok(Self {
            columns,
            rows,
            cell_width: width,
            cell_height: height,
        })
    }

    pub fn width(&self) -> u32 {
        self.columns * self.cell_width
    }

    pub fn height(&self) -> u32 {
        self.rows * self.cell_height
    }

    /// Top-left pixel of image `index`, filled row by row.
    pub fn cell_origin(&self, index: u32) -> (u32, u32) {
        (
            index % self.columns * self.cell_width,
            index / self.columns * self.cell_height,
        )
    }
}

/// Equally sized images packed into one 2D texture.
pub struct TextureAtlas {
    pub image: GpuImage,
    pub layout: AtlasLayout,
    pub count: u32,
}

impl TextureAtlas {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, images: &ImageSet) -> InitResult<Self> {
        let count = images.len() as u32;
        let layout = AtlasLayout::new(
            count,
            images.width,
            images.height,
            device.limits().max_texture_dimension_2d,
        )?;

        let size = wgpu::Extent3d {
            width: layout.width(),
            height: layout.height(),
            depth_or_array_layers: 1,
        };
        let image = GpuImage::new(device, label, size, wgpu::TextureViewDimension::D2);

        for (index, rgba) in images.images.iter().enumerate() {
            image.write(queue, 0, layout.cell_origin(index as u32), rgba);
        }

        log::debug!("{label}: {count} images in {}x{} grid", layout.columns, layout.rows);

        Ok(Self { image, layout, count })
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.image.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_faces_within_limits_pass() {
        let limits = wgpu::Limits::downlevel_defaults();

        assert!(check_cube_faces(512, 512, 6, &limits).is_ok());
        assert!(check_cube_faces(64, 64, 42 * 6, &limits).is_ok());
    }

    #[test]
    fn too_many_materials_exceed_the_layer_limit() {
        let limits = wgpu::Limits::downlevel_defaults();

        assert!(matches!(
            check_cube_faces(64, 64, 43 * 6, &limits),
            Err(InitError::TooManyLayers { layers: 258, max: 256 })
        ));
    }

    #[test]
    fn faces_must_be_square_and_complete() {
        let limits = wgpu::Limits::default();

        assert!(matches!(
            check_cube_faces(64, 32, 6, &limits),
            Err(InitError::NonSquareFaces { width: 64, height: 32 })
        ));
        assert!(matches!(
            check_cube_faces(64, 64, 7, &limits),
            Err(InitError::IncompleteCube(7))
        ));
        assert!(matches!(
            check_cube_faces(64, 64, 0, &limits),
            Err(InitError::IncompleteCube(0))
        ));
    }

    #[test]
    fn oversized_faces_are_rejected() {
        let limits = wgpu::Limits::downlevel_defaults();
        let size = limits.max_texture_dimension_2d * 2;

        assert!(matches!(
            check_cube_faces(size, size, 6, &limits),
            Err(InitError::TextureTooLarge { .. })
        ));
    }

    #[test]
    fn atlas_fills_rows_first() {
        let layout = AtlasLayout::new(10, 256, 128, 1024).unwrap();

        assert_eq!(layout.columns, 4);
        assert_eq!(layout.rows, 3);
        assert_eq!(layout.width(), 1024);
        assert_eq!(layout.height(), 384);
        assert_eq!(layout.cell_origin(0), (0, 0));
        assert_eq!(layout.cell_origin(5), (256, 128));
        assert_eq!(layout.cell_origin(9), (256, 256));
    }

    #[test]
    fn few_images_stay_on_one_row() {
        let layout = AtlasLayout::new(3, 64, 64, 8192).unwrap();
        assert_eq!((layout.columns, layout.rows), (3, 1));
        assert_eq!(layout.width(), 192);
    }

    #[test]
    fn oversized_atlas_is_rejected() {
        assert!(matches!(
            AtlasLayout::new(64, 512, 512, 2048),
            Err(InitError::AtlasTooLarge { columns: 4, rows: 16, .. })
        ));
        assert!(AtlasLayout::new(1, 4096, 16, 2048).is_err());
        assert!(AtlasLayout::new(16, 512, 512, 2048).is_ok());
    }
}
