//! The closed set of GPU element types.

use crate::error::{Error, Result};

/// Element type of a vertex attribute stream or pixel transfer.
///
/// Packed types (`UNSIGNED_SHORT_5_6_5`, `UNSIGNED_INT_24_8`, ...) describe a
/// whole pixel in one value and therefore count as a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// `GL_BYTE`
    Byte,
    /// `GL_UNSIGNED_BYTE`
    UnsignedByte,
    /// `GL_SHORT`
    Short,
    /// `GL_UNSIGNED_SHORT`
    UnsignedShort,
    /// `GL_INT`
    Int,
    /// `GL_UNSIGNED_INT`
    UnsignedInt,
    /// `GL_HALF_FLOAT`
    HalfFloat,
    /// `GL_FLOAT`
    Float,
    /// `GL_DOUBLE`
    Double,
    /// A packed integer format, identified by its GL enum.
    Packed(PackedType),
}

/// Packed pixel types; each packs all components into one 1-, 2- or 4-byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[expect(missing_docs)]
pub enum PackedType {
    UnsignedByte332,
    UnsignedByte233Rev,
    UnsignedShort565,
    UnsignedShort565Rev,
    UnsignedShort4444,
    UnsignedShort4444Rev,
    UnsignedShort5551,
    UnsignedShort1555Rev,
    UnsignedInt8888,
    UnsignedInt8888Rev,
    UnsignedInt1010102,
    UnsignedInt2101010Rev,
    UnsignedInt248,
    UnsignedInt10f11f11fRev,
    UnsignedInt5999Rev,
    Float32UnsignedInt248Rev,
}

impl PackedType {
    const ALL: [Self; 16] = [
        Self::UnsignedByte332,
        Self::UnsignedByte233Rev,
        Self::UnsignedShort565,
        Self::UnsignedShort565Rev,
        Self::UnsignedShort4444,
        Self::UnsignedShort4444Rev,
        Self::UnsignedShort5551,
        Self::UnsignedShort1555Rev,
        Self::UnsignedInt8888,
        Self::UnsignedInt8888Rev,
        Self::UnsignedInt1010102,
        Self::UnsignedInt2101010Rev,
        Self::UnsignedInt248,
        Self::UnsignedInt10f11f11fRev,
        Self::UnsignedInt5999Rev,
        Self::Float32UnsignedInt248Rev,
    ];

    /// The GL enum value.
    pub fn to_gl(self) -> u32 {
        match self {
            Self::UnsignedByte332 => glow::UNSIGNED_BYTE_3_3_2,
            Self::UnsignedByte233Rev => glow::UNSIGNED_BYTE_2_3_3_REV,
            Self::UnsignedShort565 => glow::UNSIGNED_SHORT_5_6_5,
            Self::UnsignedShort565Rev => glow::UNSIGNED_SHORT_5_6_5_REV,
            Self::UnsignedShort4444 => glow::UNSIGNED_SHORT_4_4_4_4,
            Self::UnsignedShort4444Rev => glow::UNSIGNED_SHORT_4_4_4_4_REV,
            Self::UnsignedShort5551 => glow::UNSIGNED_SHORT_5_5_5_1,
            Self::UnsignedShort1555Rev => glow::UNSIGNED_SHORT_1_5_5_5_REV,
            Self::UnsignedInt8888 => glow::UNSIGNED_INT_8_8_8_8,
            Self::UnsignedInt8888Rev => glow::UNSIGNED_INT_8_8_8_8_REV,
            Self::UnsignedInt1010102 => UNSIGNED_INT_10_10_10_2,
            Self::UnsignedInt2101010Rev => glow::UNSIGNED_INT_2_10_10_10_REV,
            Self::UnsignedInt248 => glow::UNSIGNED_INT_24_8,
            Self::UnsignedInt10f11f11fRev => glow::UNSIGNED_INT_10F_11F_11F_REV,
            Self::UnsignedInt5999Rev => glow::UNSIGNED_INT_5_9_9_9_REV,
            Self::Float32UnsignedInt248Rev => glow::FLOAT_32_UNSIGNED_INT_24_8_REV,
        }
    }

    /// Size of one packed value in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::UnsignedByte332 | Self::UnsignedByte233Rev => 1,
            Self::UnsignedShort565
            | Self::UnsignedShort565Rev
            | Self::UnsignedShort4444
            | Self::UnsignedShort4444Rev
            | Self::UnsignedShort5551
            | Self::UnsignedShort1555Rev => 2,
            // FLOAT_32_UNSIGNED_INT_24_8_REV is two words per pixel.
            Self::Float32UnsignedInt248Rev => 8,
            _ => 4,
        }
    }
}

impl ComponentType {
    /// Map a GL type enum, failing with *invalid-argument* for anything else.
    pub fn from_gl(value: u32) -> Result<Self> {
        Ok(match value {
            glow::BYTE => Self::Byte,
            glow::UNSIGNED_BYTE => Self::UnsignedByte,
            glow::SHORT => Self::Short,
            glow::UNSIGNED_SHORT => Self::UnsignedShort,
            glow::INT => Self::Int,
            glow::UNSIGNED_INT => Self::UnsignedInt,
            glow::HALF_FLOAT | HALF_FLOAT_OES => Self::HalfFloat,
            glow::FLOAT => Self::Float,
            glow::DOUBLE => Self::Double,
            other => PackedType::ALL
                .into_iter()
                .find(|p| p.to_gl() == other)
                .map(Self::Packed)
                .ok_or_else(|| Error::invalid_argument(format!("unknown GL type {other:#x}")))?,
        })
    }

    /// The GL enum value.
    pub fn to_gl(self) -> u32 {
        match self {
            Self::Byte => glow::BYTE,
            Self::UnsignedByte => glow::UNSIGNED_BYTE,
            Self::Short => glow::SHORT,
            Self::UnsignedShort => glow::UNSIGNED_SHORT,
            Self::Int => glow::INT,
            Self::UnsignedInt => glow::UNSIGNED_INT,
            Self::HalfFloat => glow::HALF_FLOAT,
            Self::Float => glow::FLOAT,
            Self::Double => glow::DOUBLE,
            Self::Packed(p) => p.to_gl(),
        }
    }

    /// Bytes per component: 1, 2, 4 or 8.
    pub fn bytes_per_component(self) -> usize {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort | Self::HalfFloat => 2,
            Self::Int | Self::UnsignedInt | Self::Float => 4,
            Self::Double => 8,
            Self::Packed(p) => p.bytes(),
        }
    }

    /// Whether values of this type carry a sign.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Short | Self::Int | Self::HalfFloat | Self::Float | Self::Double
        )
    }

    /// `true` for everything except half, float and double.
    pub fn is_fixed_point(self) -> bool {
        !matches!(self, Self::HalfFloat | Self::Float | Self::Double)
    }

    /// Component count override for packed formats (always 1).
    pub fn components_per_pixel(self) -> Option<usize> {
        match self {
            Self::Packed(_) => Some(1),
            _ => None,
        }
    }
}

/// `GL_HALF_FLOAT_OES`, the ES 2 extension alias of `GL_HALF_FLOAT`.
pub const HALF_FLOAT_OES: u32 = 0x8D61;

/// `GL_UNSIGNED_INT_10_10_10_2`.
pub const UNSIGNED_INT_10_10_10_2: u32 = 0x8036;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(glow::BYTE, 1, true, true)]
    #[case(glow::UNSIGNED_SHORT, 2, false, true)]
    #[case(glow::HALF_FLOAT, 2, true, false)]
    #[case(glow::FLOAT, 4, true, false)]
    #[case(glow::DOUBLE, 8, true, false)]
    #[case(glow::UNSIGNED_SHORT_5_6_5, 2, false, true)]
    #[case(glow::UNSIGNED_INT_24_8, 4, false, true)]
    #[case(glow::UNSIGNED_BYTE_3_3_2, 1, false, true)]
    fn test_type_properties(
        #[case] gl: u32,
        #[case] bytes: usize,
        #[case] signed: bool,
        #[case] fixed: bool,
    ) {
        let ty = ComponentType::from_gl(gl).expect("known type");
        assert_eq!(ty.bytes_per_component(), bytes);
        assert_eq!(ty.is_signed(), signed);
        assert_eq!(ty.is_fixed_point(), fixed);
        assert_eq!(ty.to_gl(), gl);
    }

    #[test]
    fn test_packed_override() {
        let ty = ComponentType::from_gl(glow::UNSIGNED_INT_2_10_10_10_REV).expect("packed");
        assert_eq!(ty.components_per_pixel(), Some(1));
        assert_eq!(ComponentType::Float.components_per_pixel(), None);
    }

    #[test]
    fn test_unknown_type() {
        assert!(matches!(
            ComponentType::from_gl(glow::RGBA),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(
            ComponentType::from_gl(HALF_FLOAT_OES).expect("alias"),
            ComponentType::HalfFloat
        );
    }
}
