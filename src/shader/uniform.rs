//! Uniform types and the values that can be written into them.

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

/// Type of a reflected uniform member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    Uint,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
    /// Anything else host-shareable; only writable as raw bytes
    Other { size: u32 },
}

impl UniformType {
    /// Bytes the member occupies inside its block, including matrix column padding.
    pub fn size(&self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Uint => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat2 => 16,
            UniformType::Mat3 => 48,
            UniformType::Mat4 => 64,
            UniformType::Other { size } => *size,
        }
    }
}

/// A value a uniform setter accepts.
pub trait UniformValue {
    /// Name used in type mismatch errors
    const NAME: &'static str;

    fn accepts(ty: UniformType) -> bool;

    /// Encode into `out`, which is exactly `ty.size()` bytes.
    fn write(&self, ty: UniformType, out: &mut [u8]);
}

fn put(out: &mut [u8], values: &[f32]) {
    out[..values.len() * 4].copy_from_slice(bytemuck::cast_slice(values));
}

impl UniformValue for f32 {
    const NAME: &'static str = "f32";

    fn accepts(ty: UniformType) -> bool {
        ty == UniformType::Float
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        put(out, &[*self]);
    }
}

impl UniformValue for i32 {
    const NAME: &'static str = "i32";

    fn accepts(ty: UniformType) -> bool {
        matches!(ty, UniformType::Int | UniformType::Uint)
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_ne_bytes());
    }
}

impl UniformValue for u32 {
    const NAME: &'static str = "u32";

    fn accepts(ty: UniformType) -> bool {
        matches!(ty, UniformType::Int | UniformType::Uint)
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_ne_bytes());
    }
}

/// Booleans are not host-shareable in WGSL; they are stored as 0/1 integers.
impl UniformValue for bool {
    const NAME: &'static str = "bool";

    fn accepts(ty: UniformType) -> bool {
        matches!(ty, UniformType::Int | UniformType::Uint)
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        out[..4].copy_from_slice(&(*self as u32).to_ne_bytes());
    }
}

impl UniformValue for Vec2 {
    const NAME: &'static str = "vec2";

    fn accepts(ty: UniformType) -> bool {
        ty == UniformType::Vec2
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        put(out, &self.to_array());
    }
}

impl UniformValue for Vec3 {
    const NAME: &'static str = "vec3";

    fn accepts(ty: UniformType) -> bool {
        ty == UniformType::Vec3
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        put(out, &self.to_array());
    }
}

impl UniformValue for Vec4 {
    const NAME: &'static str = "vec4";

    fn accepts(ty: UniformType) -> bool {
        ty == UniformType::Vec4
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        put(out, &self.to_array());
    }
}

impl UniformValue for Mat2 {
    const NAME: &'static str = "mat2";

    fn accepts(ty: UniformType) -> bool {
        ty == UniformType::Mat2
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        put(out, &self.to_cols_array());
    }
}

impl UniformValue for Mat3 {
    const NAME: &'static str = "mat3";

    fn accepts(ty: UniformType) -> bool {
        ty == UniformType::Mat3
    }

    // Columns of a mat3x3 are 16-byte aligned in uniform memory.
    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        for (index, column) in [self.x_axis, self.y_axis, self.z_axis].iter().enumerate() {
            put(&mut out[index * 16..], &column.to_array());
        }
    }
}

impl UniformValue for Mat4 {
    const NAME: &'static str = "mat4";

    fn accepts(ty: UniformType) -> bool {
        ty == UniformType::Mat4
    }

    fn write(&self, _ty: UniformType, out: &mut [u8]) {
        put(out, &self.to_cols_array());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<V: UniformValue>(value: V, ty: UniformType) -> Vec<u8> {
        let mut out = vec![0xAA; ty.size() as usize];
        value.write(ty, &mut out);
        out
    }

    #[test]
    fn test_mat3_columns_are_padded() {
        let bytes = encode(Mat3::from_cols(Vec3::X, Vec3::Y, Vec3::Z), UniformType::Mat3);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(&floats[0..3], &[1.0, 0.0, 0.0]);
        assert_eq!(&floats[4..7], &[0.0, 1.0, 0.0]);
        assert_eq!(&floats[8..11], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_bool_is_an_integer() {
        assert!(bool::accepts(UniformType::Int));
        assert!(!bool::accepts(UniformType::Float));
        assert_eq!(encode(true, UniformType::Uint), 1u32.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_type_checks() {
        assert!(f32::accepts(UniformType::Float));
        assert!(!f32::accepts(UniformType::Vec2));
        assert!(Mat4::accepts(UniformType::Mat4));
        assert!(!Vec3::accepts(UniformType::Vec4));
        assert!(!Vec4::accepts(UniformType::Other { size: 16 }));
    }
}
