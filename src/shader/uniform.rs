//! Named uniform values and uniform-block bindings.

use std::fmt;

use crate::error::{Error, Result};
use crate::gpu::Gpu;

/// Payload of a uniform.
#[derive(Debug, Clone, PartialEq)]
#[expect(missing_docs)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    /// Column-major 2×2 matrix.
    Mat2([f32; 4]),
    /// Column-major 3×3 matrix.
    Mat3([f32; 9]),
    /// Column-major 4×4 matrix.
    Mat4([f32; 16]),
    /// A float array of `components`-wide vectors.
    Floats { components: usize, data: Vec<f32> },
    /// An int array of `components`-wide vectors.
    Ints { components: usize, data: Vec<i32> },
    /// An array of column-major 4×4 matrices (e.g. projection, modelview).
    Mat4Array(Vec<[f32; 16]>),
    /// A uniform block sourced from `buffer` through binding point `binding`.
    Block { binding: u32, buffer: u32 },
}

impl UniformValue {
    /// Whether this is a buffer-backed uniform block.
    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Block { .. })
    }
}

/// Called right before every send so the value can be refreshed from its
/// source (a matrix stack, an animation clock, ...).
pub type UniformSync = Box<dyn FnMut(&mut UniformValue)>;

/// A named uniform, its resolved location and its value.
///
/// For blocks the location holds the block index.
pub struct GlUniformData {
    name: String,
    location: i32,
    value: UniformValue,
    sync: Option<UniformSync>,
}

impl GlUniformData {
    /// An unresolved uniform.
    pub fn new(name: impl Into<String>, value: UniformValue) -> Self {
        Self {
            name: name.into(),
            location: -1,
            value,
            sync: None,
        }
    }

    /// Attach a sync hook.
    #[must_use]
    pub fn with_sync(mut self, sync: impl FnMut(&mut UniformValue) + 'static) -> Self {
        self.sync = Some(Box::new(sync));
        self
    }

    /// Uniform or block name as declared in GLSL.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved location (block index for blocks), `-1` if unresolved.
    pub fn location(&self) -> i32 {
        self.location
    }

    /// Set the resolved location.
    pub fn set_location(&mut self, location: i32) {
        self.location = location;
    }

    /// Whether the location is resolved.
    pub fn has_location(&self) -> bool {
        self.location >= 0
    }

    /// Current value.
    pub fn value(&self) -> &UniformValue {
        &self.value
    }

    /// Replace the value. The next send uploads it.
    pub fn set_value(&mut self, value: UniformValue) {
        self.value = value;
    }

    /// Whether this is a buffer-backed uniform block.
    pub fn is_buffer(&self) -> bool {
        self.value.is_buffer()
    }

    /// Run the sync hook, then upload the value at the resolved location.
    ///
    /// Blocks are bound with `glUniformBlockBinding` on `program` and
    /// `glBindBufferBase(UNIFORM_BUFFER)`.
    ///
    /// # Errors
    ///
    /// *invalid-state* when the location is unresolved; *invalid-argument*
    /// for an array whose length is not a multiple of its vector width.
    pub fn send(&mut self, gpu: &dyn Gpu, program: u32) -> Result<()> {
        if let Some(sync) = &mut self.sync {
            sync(&mut self.value);
        }
        let loc = self.location;
        if loc < 0 {
            return Err(Error::invalid_state(format!(
                "uniform {} has no location",
                self.name
            )));
        }
        match &self.value {
            UniformValue::Int(v) => gpu.uniform_i32(loc, 1, &[*v]),
            UniformValue::Float(v) => gpu.uniform_f32(loc, 1, &[*v]),
            UniformValue::Vec2(v) => gpu.uniform_f32(loc, 2, v),
            UniformValue::Vec3(v) => gpu.uniform_f32(loc, 3, v),
            UniformValue::Vec4(v) => gpu.uniform_f32(loc, 4, v),
            UniformValue::IVec2(v) => gpu.uniform_i32(loc, 2, v),
            UniformValue::IVec3(v) => gpu.uniform_i32(loc, 3, v),
            UniformValue::IVec4(v) => gpu.uniform_i32(loc, 4, v),
            UniformValue::Mat2(m) => gpu.uniform_matrix_f32(loc, 2, false, m),
            UniformValue::Mat3(m) => gpu.uniform_matrix_f32(loc, 3, false, m),
            UniformValue::Mat4(m) => gpu.uniform_matrix_f32(loc, 4, false, m),
            UniformValue::Floats { components, data } => {
                check_array(&self.name, *components, data.len())?;
                gpu.uniform_f32(loc, *components, data);
            }
            UniformValue::Ints { components, data } => {
                check_array(&self.name, *components, data.len())?;
                gpu.uniform_i32(loc, *components, data);
            }
            UniformValue::Mat4Array(ms) => {
                gpu.uniform_matrix_f32(loc, 4, false, bytemuck::cast_slice(ms));
            }
            UniformValue::Block { binding, buffer } => {
                #[expect(clippy::cast_sign_loss)]
                let block_index = loc as u32;
                gpu.uniform_block_binding(program, block_index, *binding);
                gpu.bind_buffer_base(glow::UNIFORM_BUFFER, *binding, *buffer);
            }
        }
        Ok(())
    }
}

fn check_array(name: &str, components: usize, len: usize) -> Result<()> {
    if !(1..=4).contains(&components) || len % components != 0 {
        return Err(Error::invalid_argument(format!(
            "uniform {name}: {len} values do not form vec{components} elements"
        )));
    }
    Ok(())
}

impl fmt::Debug for GlUniformData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlUniformData")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("value", &self.value)
            .field("synced", &self.sync.is_some())
            .finish()
    }
}

impl fmt::Display for GlUniformData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[loc {}, {:?}]", self.name, self.location, self.value)
    }
}
