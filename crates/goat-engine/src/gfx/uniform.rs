//! Typed uniform values and the (shape, element type) dispatch table.
//!
//! Callers hand the render context a flat slice of `f32`, `i32` or `u32` plus a
//! shape. The table below decides which upload the driver performs; any
//! combination missing from it is rejected before the driver is touched.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{GfxError, Result};

/// Scalar family of a uniform component.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ElementType {
    Float,
    Int,
    UInt,
}

/// Shape of a uniform upload.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformShape {
    /// `n` components; `Vector(1)` is a scalar.
    Vector(usize),
    /// `n` x `n` column-major matrix.
    Matrix(usize),
}

impl UniformShape {
    fn component_count(self) -> usize {
        match self {
            UniformShape::Vector(n) => n,
            UniformShape::Matrix(n) => n * n,
        }
    }
}

/// Concrete uniform type a driver understands.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformKind {
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl UniformKind {
    pub fn element_type(self) -> ElementType {
        use UniformKind::*;
        match self {
            Int | IVec2 | IVec3 | IVec4 => ElementType::Int,
            UInt | UVec2 | UVec3 | UVec4 => ElementType::UInt,
            Float | Vec2 | Vec3 | Vec4 | Mat2 | Mat3 | Mat4 => ElementType::Float,
        }
    }

    pub fn component_count(self) -> usize {
        use UniformKind::*;
        match self {
            Int | UInt | Float => 1,
            IVec2 | UVec2 | Vec2 => 2,
            IVec3 | UVec3 | Vec3 => 3,
            IVec4 | UVec4 | Vec4 | Mat2 => 4,
            Mat3 => 9,
            Mat4 => 16,
        }
    }

    /// Matrix dimension, if this is a matrix kind.
    pub fn matrix_dimension(self) -> Option<usize> {
        match self {
            UniformKind::Mat2 => Some(2),
            UniformKind::Mat3 => Some(3),
            UniformKind::Mat4 => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UniformKind::Int => "i32",
            UniformKind::IVec2 => "vec2<i32>",
            UniformKind::IVec3 => "vec3<i32>",
            UniformKind::IVec4 => "vec4<i32>",
            UniformKind::UInt => "u32",
            UniformKind::UVec2 => "vec2<u32>",
            UniformKind::UVec3 => "vec3<u32>",
            UniformKind::UVec4 => "vec4<u32>",
            UniformKind::Float => "f32",
            UniformKind::Vec2 => "vec2<f32>",
            UniformKind::Vec3 => "vec3<f32>",
            UniformKind::Vec4 => "vec4<f32>",
            UniformKind::Mat2 => "mat2x2<f32>",
            UniformKind::Mat3 => "mat3x3<f32>",
            UniformKind::Mat4 => "mat4x4<f32>",
        };
        f.write_str(s)
    }
}

static DISPATCH: LazyLock<HashMap<(UniformShape, ElementType), UniformKind>> =
    LazyLock::new(|| {
        use ElementType::*;
        use UniformShape::*;

        HashMap::from([
            ((Vector(1), Float), UniformKind::Float),
            ((Vector(2), Float), UniformKind::Vec2),
            ((Vector(3), Float), UniformKind::Vec3),
            ((Vector(4), Float), UniformKind::Vec4),
            ((Vector(1), Int), UniformKind::Int),
            ((Vector(2), Int), UniformKind::IVec2),
            ((Vector(3), Int), UniformKind::IVec3),
            ((Vector(4), Int), UniformKind::IVec4),
            ((Vector(1), UInt), UniformKind::UInt),
            ((Vector(2), UInt), UniformKind::UVec2),
            ((Vector(3), UInt), UniformKind::UVec3),
            ((Vector(4), UInt), UniformKind::UVec4),
            ((Matrix(2), Float), UniformKind::Mat2),
            ((Matrix(3), Float), UniformKind::Mat3),
            ((Matrix(4), Float), UniformKind::Mat4),
        ])
    });

/// Looks up the uniform kind for a shape and element type.
pub fn resolve_kind(shape: UniformShape, element: ElementType) -> Result<UniformKind> {
    DISPATCH.get(&(shape, element)).copied().ok_or_else(|| {
        GfxError::UnsupportedUniformType(format!("{element:?} {shape:?}"))
    })
}

/// Raw component storage of a uniform value.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U32(Vec<u32>),
}

impl UniformData {
    pub fn len(&self) -> usize {
        match self {
            UniformData::F32(v) => v.len(),
            UniformData::I32(v) => v.len(),
            UniformData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformData::F32(v) => bytemuck::cast_slice(v),
            UniformData::I32(v) => bytemuck::cast_slice(v),
            UniformData::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// A typed value ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformValue {
    pub kind: UniformKind,
    pub data: UniformData,
}

impl UniformValue {
    /// Builds a value from a flat slice, validating it against the dispatch table.
    pub fn new<T: UniformElement>(shape: UniformShape, values: &[T]) -> Result<Self> {
        let kind = resolve_kind(shape, T::ELEMENT)?;
        if values.len() != shape.component_count() {
            return Err(GfxError::UnsupportedUniformType(format!(
                "{kind} expects {} components, got {}",
                shape.component_count(),
                values.len()
            )));
        }
        Ok(Self {
            kind,
            data: T::pack(values),
        })
    }

    pub fn int(v: i32) -> Self {
        Self {
            kind: UniformKind::Int,
            data: UniformData::I32(vec![v]),
        }
    }

    pub fn uint(v: u32) -> Self {
        Self {
            kind: UniformKind::UInt,
            data: UniformData::U32(vec![v]),
        }
    }

    pub fn float(v: f32) -> Self {
        Self {
            kind: UniformKind::Float,
            data: UniformData::F32(vec![v]),
        }
    }

    pub fn mat4(m: &glam::Mat4) -> Self {
        Self {
            kind: UniformKind::Mat4,
            data: UniformData::F32(m.to_cols_array().to_vec()),
        }
    }
}

/// Scalar types that may be uploaded as uniform components.
pub trait UniformElement: Copy + 'static {
    const ELEMENT: ElementType;

    fn pack(values: &[Self]) -> UniformData;
}

impl UniformElement for f32 {
    const ELEMENT: ElementType = ElementType::Float;

    fn pack(values: &[Self]) -> UniformData {
        UniformData::F32(values.to_vec())
    }
}

impl UniformElement for i32 {
    const ELEMENT: ElementType = ElementType::Int;

    fn pack(values: &[Self]) -> UniformData {
        UniformData::I32(values.to_vec())
    }
}

impl UniformElement for u32 {
    const ELEMENT: ElementType = ElementType::UInt;

    fn pack(values: &[Self]) -> UniformData {
        UniformData::U32(values.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_vectors_resolve_by_component_count() {
        assert_eq!(resolve_kind(UniformShape::Vector(1), ElementType::Float).unwrap(), UniformKind::Float);
        assert_eq!(resolve_kind(UniformShape::Vector(3), ElementType::Float).unwrap(), UniformKind::Vec3);
        assert_eq!(resolve_kind(UniformShape::Vector(4), ElementType::UInt).unwrap(), UniformKind::UVec4);
    }

    #[test]
    fn integer_matrices_are_unsupported() {
        let err = resolve_kind(UniformShape::Matrix(4), ElementType::Int).unwrap_err();
        assert!(matches!(err, GfxError::UnsupportedUniformType(_)));
    }

    #[test]
    fn oversized_vectors_are_unsupported() {
        assert!(resolve_kind(UniformShape::Vector(5), ElementType::Float).is_err());
        assert!(resolve_kind(UniformShape::Vector(0), ElementType::Int).is_err());
        assert!(resolve_kind(UniformShape::Matrix(5), ElementType::Float).is_err());
    }

    #[test]
    fn value_rejects_wrong_component_count() {
        let err = UniformValue::new(UniformShape::Matrix(3), &[1.0f32; 4]).unwrap_err();
        assert!(matches!(err, GfxError::UnsupportedUniformType(_)));
    }

    #[test]
    fn mat4_value_is_column_major() {
        let m = glam::Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let v = UniformValue::mat4(&m);
        let UniformData::F32(data) = &v.data else {
            panic!("expected float data");
        };
        assert_eq!(&data[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(v.data.as_bytes().len(), 64);
    }
}
