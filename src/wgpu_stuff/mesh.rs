//! Cube-sphere mesh: six subdivided cube faces pushed out onto a sphere.

use bytemuck::{AnyBitPattern, NoUninit};
use ultraviolet::Vec3;
use wgpu::util::DeviceExt;

#[derive(Clone, Copy, Debug, PartialEq, NoUninit, AnyBitPattern)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Indices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Indices {
    /// Narrowest index type able to address `vertex_count` vertices.
    fn for_vertices(indices: Vec<u32>, vertex_count: usize) -> Self {
        if vertex_count > 0xffff {
            Self::U32(indices)
        } else {
            Self::U16(indices.into_iter().map(|index| index as u16).collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U16(indices) => indices.len(),
            Self::U32(indices) => indices.len(),
        }
    }

    pub fn format(&self) -> wgpu::IndexFormat {
        match self {
            Self::U16(_) => wgpu::IndexFormat::Uint16,
            Self::U32(_) => wgpu::IndexFormat::Uint32,
        }
    }

    #[cfg(test)]
    fn get(&self, i: usize) -> u32 {
        match self {
            Self::U16(indices) => indices[i] as u32,
            Self::U32(indices) => indices[i],
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            Self::U16(indices) => bytemuck::cast_slice(indices),
            Self::U32(indices) => bytemuck::cast_slice(indices),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Indices,
}

impl MeshData {
    /// Sphere of `radius` with `resolution` quads along each cube face edge.
    pub fn sphere(resolution: u32, radius: f32) -> Self {
        let directions = [
            Vec3::unit_x(),
            -Vec3::unit_x(),
            Vec3::unit_y(),
            -Vec3::unit_y(),
            Vec3::unit_z(),
            -Vec3::unit_z(),
        ];
        let n = resolution.max(1);
        let row = n + 1;

        let mut vertices = Vec::with_capacity(6 * (row * row) as usize);
        let mut indices = Vec::with_capacity(6 * (n * n * 6) as usize);

        for direction in directions {
            let base = vertices.len() as u32;
            let u_axis = Vec3::new(direction.y, direction.z, direction.x);
            let v_axis = direction.cross(u_axis);

            for u in 0..=n {
                for v in 0..=n {
                    let s = u as f32 / n as f32 * 2.0 - 1.0;
                    let t = v as f32 / n as f32 * 2.0 - 1.0;
                    let on_cube = direction + u_axis * s + v_axis * t;
                    let normal = cube_to_sphere(on_cube);

                    vertices.push(Vertex {
                        position: (normal * radius).into(),
                        normal: normal.into(),
                    });

                    if u < n && v < n {
                        let i = base + u * row + v;
                        indices.extend_from_slice(&[i, i + row, i + row + 1, i, i + row + 1, i + 1]);
                    }
                }
            }
        }

        let indices = Indices::for_vertices(indices, vertices.len());
        Self { vertices, indices }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Maps a point on the `[-1, 1]` cube onto the unit sphere, spreading
/// vertices more evenly than plain normalisation.
fn cube_to_sphere(p: Vec3) -> Vec3 {
    let (x2, y2, z2) = (p.x * p.x, p.y * p.y, p.z * p.z);
    let mapped = Vec3::new(
        p.x * (1.0 - y2 / 2.0 - z2 / 2.0 + y2 * z2 / 3.0).sqrt(),
        p.y * (1.0 - z2 / 2.0 - x2 / 2.0 + z2 * x2 / 3.0).sqrt(),
        p.z * (1.0 - x2 / 2.0 - y2 / 2.0 + x2 * y2 / 3.0).sqrt(),
    );
    mapped.normalized()
}

/// Mesh uploaded to vertex and index buffers.
pub struct Mesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_format: wgpu::IndexFormat,
    pub index_count: u32,
}

impl Mesh {
    pub fn new(device: &wgpu::Device, label: &str, data: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: data.indices.bytes(),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_format: data.indices.format(),
            index_count: data.index_count(),
        }
    }

    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), self.index_format);
    }
}
