//! Shader code, programs, uniforms and the shader state that ties them to
//! attribute streams.
//!
//! Objects shared between a program, a shader state and the application are
//! reference counted ([`SharedCode`], [`SharedProgram`], [`SharedArray`],
//! [`SharedUniform`]). Everything here is single-threaded and must stay on the
//! thread that has the GL context current.

mod code;
mod customize;
mod include;
mod program;
mod state;
mod uniform;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use code::{ShaderBinary, ShaderCode, ShaderSource};
pub use customize::{
    default_defines, default_precision, extension_directive, requires_default_precision,
    Customization, ExtensionBehavior, Precision,
};
pub use include::read_source;
pub use program::ShaderProgram;
pub use state::{ShaderState, StateToken};
pub use uniform::{GlUniformData, UniformSync, UniformValue};

use crate::array_data::GlArrayData;
use crate::error::{Error, Result};
use crate::gpu::ContextInfo;

/// Shader code shared between programs.
pub type SharedCode = Rc<RefCell<ShaderCode>>;
/// A program shared between a shader state and the application.
pub type SharedProgram = Rc<RefCell<ShaderProgram>>;
/// An attribute stream shared between a shader state and the application.
pub type SharedArray = Rc<RefCell<GlArrayData>>;
/// A uniform shared between a shader state and the application.
pub type SharedUniform = Rc<RefCell<GlUniformData>>;

/// Pipeline stage of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// `GL_VERTEX_SHADER`
    Vertex,
    /// `GL_FRAGMENT_SHADER`
    Fragment,
    /// `GL_GEOMETRY_SHADER`
    Geometry,
    /// `GL_TESS_CONTROL_SHADER`
    TessControl,
    /// `GL_TESS_EVALUATION_SHADER`
    TessEvaluation,
    /// `GL_COMPUTE_SHADER`
    Compute,
}

impl ShaderStage {
    /// The GL enum value.
    pub fn to_gl(self) -> u32 {
        match self {
            Self::Vertex => glow::VERTEX_SHADER,
            Self::Fragment => glow::FRAGMENT_SHADER,
            Self::Geometry => glow::GEOMETRY_SHADER,
            Self::TessControl => glow::TESS_CONTROL_SHADER,
            Self::TessEvaluation => glow::TESS_EVALUATION_SHADER,
            Self::Compute => glow::COMPUTE_SHADER,
        }
    }

    /// Map a GL shader type enum.
    ///
    /// # Errors
    ///
    /// *invalid-argument* for anything that is not a shader type.
    pub fn from_gl(value: u32) -> Result<Self> {
        Ok(match value {
            glow::VERTEX_SHADER => Self::Vertex,
            glow::FRAGMENT_SHADER => Self::Fragment,
            glow::GEOMETRY_SHADER => Self::Geometry,
            glow::TESS_CONTROL_SHADER => Self::TessControl,
            glow::TESS_EVALUATION_SHADER => Self::TessEvaluation,
            glow::COMPUTE_SHADER => Self::Compute,
            other => {
                return Err(Error::invalid_argument(format!(
                    "unknown shader type {other:#x}"
                )))
            }
        })
    }

    /// File suffix for source (`binary == false`) or binary files.
    pub fn file_suffix(self, binary: bool) -> &'static str {
        match (self, binary) {
            (Self::Vertex, false) => "vp",
            (Self::Vertex, true) => "bvp",
            (Self::Fragment, false) => "fp",
            (Self::Fragment, true) => "bfp",
            (Self::Geometry, false) => "gp",
            (Self::Geometry, true) => "bgp",
            (Self::TessControl, false) => "tcp",
            (Self::TessControl, true) => "btcp",
            (Self::TessEvaluation, false) => "tep",
            (Self::TessEvaluation, true) => "btep",
            (Self::Compute, false) => "cp",
            (Self::Compute, true) => "bcp",
        }
    }

    /// Whether the context can run this stage.
    pub fn is_supported(self, info: &ContextInfo) -> bool {
        match self {
            Self::Vertex | Self::Fragment => true,
            Self::Geometry => info.has_geometry_shader(),
            Self::TessControl | Self::TessEvaluation => info.has_tessellation(),
            Self::Compute => info.has_compute(),
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
            Self::TessControl => "tess-control",
            Self::TessEvaluation => "tess-eval",
            Self::Compute => "compute",
        })
    }
}

/// `GL_NVIDIA_PLATFORM_BINARY_NV`.
pub const NVIDIA_PLATFORM_BINARY_NV: u32 = 0x890B;

/// Folder, relative to the binary root, holding shader binaries of `format`.
pub fn binary_sub_path(format: u32) -> Option<&'static str> {
    match format {
        NVIDIA_PLATFORM_BINARY_NV => Some("nvidia"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ShaderStage::Vertex, "vp", "bvp")]
    #[case(ShaderStage::Fragment, "fp", "bfp")]
    #[case(ShaderStage::Geometry, "gp", "bgp")]
    #[case(ShaderStage::TessControl, "tcp", "btcp")]
    #[case(ShaderStage::TessEvaluation, "tep", "btep")]
    #[case(ShaderStage::Compute, "cp", "bcp")]
    fn test_file_suffix(#[case] stage: ShaderStage, #[case] source: &str, #[case] binary: &str) {
        assert_eq!(stage.file_suffix(false), source);
        assert_eq!(stage.file_suffix(true), binary);
        assert_eq!(ShaderStage::from_gl(stage.to_gl()).expect("round trip"), stage);
    }

    #[test]
    fn test_stage_support() {
        let es2 = ContextInfo::es2();
        assert!(ShaderStage::Fragment.is_supported(&es2));
        assert!(!ShaderStage::Geometry.is_supported(&es2));
        assert!(ShaderStage::Compute.is_supported(&ContextInfo::gl_core(4, 5)));
        assert!(ShaderStage::from_gl(glow::FLOAT).is_err());
    }

    #[test]
    fn test_binary_sub_path() {
        assert_eq!(binary_sub_path(NVIDIA_PLATFORM_BINARY_NV), Some("nvidia"));
        assert_eq!(binary_sub_path(0x1234), None);
    }
}
