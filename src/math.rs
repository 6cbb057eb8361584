//! Small vector/matrix helpers on top of `ultraviolet`.
//!
//! Every value that ends up in a GPU buffer goes through here, so the
//! helpers refuse to produce NaN or infinity from degenerate input.

pub use ultraviolet::{Mat4, Vec3, Vec4};

/// Magnitude below which a vector is treated as zero length.
pub const NORMALISE_EPSILON: f32 = 1e-8;

/// Normalises `vector` in place.
///
/// Returns `false` and leaves the vector untouched when its magnitude is
/// below [`NORMALISE_EPSILON`].
pub fn normalise(vector: &mut Vec3) -> bool {
    let magnitude = vector.mag();

    if magnitude < NORMALISE_EPSILON {
        log::error!("Magnitude of vector too close to 0 to normalise");
        return false;
    }

    *vector /= magnitude;
    true
}

/// Copying variant of [`normalise`].
pub fn normalised(mut vector: Vec3) -> Vec3 {
    normalise(&mut vector);
    vector
}

/// Translation * scale. Bodies never rotate, so no rotation term.
pub fn model_matrix(position: Vec3, scale: Vec3) -> Mat4 {
    Mat4::new(
        Vec4::new(scale.x, 0.0, 0.0, 0.0),
        Vec4::new(0.0, scale.y, 0.0, 0.0),
        Vec4::new(0.0, 0.0, scale.z, 0.0),
        Vec4::new(position.x, position.y, position.z, 1.0),
    )
}

/// Translation column of an affine matrix.
#[cfg(test)]
pub fn translation(matrix: &Mat4) -> Vec3 {
    let column = matrix.cols[3];
    Vec3::new(column.x, column.y, column.z)
}

/// Column-major array form, the layout WGSL's `mat4x4<f32>` expects.
pub fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
    matrix.cols.map(|column| [column.x, column.y, column.z, column.w])
}

#[cfg(test)]
pub fn from_columns(columns: [[f32; 4]; 4]) -> Mat4 {
    let [c0, c1, c2, c3] = columns.map(|[x, y, z, w]| Vec4::new(x, y, z, w));
    Mat4::new(c0, c1, c2, c3)
}

/// Right-handed perspective projection with a `[0, 1]` depth range.
pub fn perspective(fov_radians: f32, aspect_ratio: f32, near: f32, far: f32) -> Mat4 {
    ultraviolet::projection::rh_yup::perspective_wgpu_dx(fov_radians, aspect_ratio, near, far)
}

pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at(eye, target, up)
}

/// Rounds `value` up to the next multiple of `multiple`.
pub fn round_up(value: u64, multiple: u64) -> u64 {
    value.div_ceil(multiple) * multiple
}
