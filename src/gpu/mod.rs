//! The GPU context abstraction.
//!
//! [`Gpu`] is the only place where GL entry points are named. Everything
//! above it issues calls through a `&dyn Gpu`, which keeps the shader and
//! array-data logic independent of the binding crate and lets the tests run
//! against a recording fake.
//!
//! Object names (shaders, programs, buffers) are plain `u32` values with `0`
//! meaning "none", exactly as GL itself reports them. Locations are `i32`
//! with `-1` meaning "unresolved".
//!
//! Implementations are thread-affine: a `Gpu` must only be used on the
//! thread that has its context current.

mod context;
#[cfg(not(target_arch = "wasm32"))]
mod glow_backend;
#[cfg(test)]
pub(crate) mod mock;

use std::ptr::NonNull;

pub use context::{parse_glsl_version, ContextInfo, GlProfile, GlVersion};
#[cfg(not(target_arch = "wasm32"))]
pub use glow_backend::GlowGpu;

use crate::error::Result;

/// Command sink for the current GL context.
///
/// The method set follows GL one-to-one; see the GL reference for the
/// semantics of each call.
pub trait Gpu {
    /// Profile, version and capabilities of the context.
    fn info(&self) -> &ContextInfo;

    /// `glCreateShader`.
    fn create_shader(&self, stage: u32) -> Result<u32>;
    /// `glShaderSource` with the segments already concatenated.
    fn shader_source(&self, shader: u32, source: &str);
    /// `glCompileShader`.
    fn compile_shader(&self, shader: u32);
    /// `GL_COMPILE_STATUS` of a shader.
    fn shader_compile_status(&self, shader: u32) -> bool;
    /// `glGetShaderInfoLog`.
    fn shader_info_log(&self, shader: u32) -> String;
    /// `glDeleteShader`.
    fn delete_shader(&self, shader: u32);
    /// `GL_SHADER_BINARY_FORMATS` advertised by the driver.
    fn shader_binary_formats(&self) -> Vec<u32>;
    /// `glShaderBinary`.
    fn shader_binary(&self, shaders: &[u32], format: u32, binary: &[u8]) -> Result<()>;

    /// `glCreateProgram`.
    fn create_program(&self) -> Result<u32>;
    /// `glAttachShader`.
    fn attach_shader(&self, program: u32, shader: u32);
    /// `glDetachShader`.
    fn detach_shader(&self, program: u32, shader: u32);
    /// `glBindAttribLocation`; only effective before the next link.
    fn bind_attrib_location(&self, program: u32, location: u32, name: &str);
    /// `glLinkProgram`.
    fn link_program(&self, program: u32);
    /// `GL_LINK_STATUS` of a program.
    fn program_link_status(&self, program: u32) -> bool;
    /// `glGetProgramInfoLog`.
    fn program_info_log(&self, program: u32) -> String;
    /// `glUseProgram`; `0` unbinds.
    fn use_program(&self, program: u32);
    /// `glDeleteProgram`.
    fn delete_program(&self, program: u32);
    /// `glGetAttribLocation`, `-1` when the attribute is not active.
    fn attrib_location(&self, program: u32, name: &str) -> i32;
    /// `glGetUniformLocation`, `-1` when the uniform is not active.
    fn uniform_location(&self, program: u32, name: &str) -> i32;
    /// `glGetUniformBlockIndex`.
    fn uniform_block_index(&self, program: u32, name: &str) -> Option<u32>;
    /// `glUniformBlockBinding`.
    fn uniform_block_binding(&self, program: u32, block_index: u32, binding: u32);

    /// `glUniform{1..4}fv` selected by `components`.
    fn uniform_f32(&self, location: i32, components: usize, values: &[f32]);
    /// `glUniform{1..4}iv` selected by `components`.
    fn uniform_i32(&self, location: i32, components: usize, values: &[i32]);
    /// `glUniformMatrix{2..4}fv` selected by `dim`.
    fn uniform_matrix_f32(&self, location: i32, dim: usize, transpose: bool, values: &[f32]);

    /// `glGenBuffers` for a single name.
    fn create_buffer(&self) -> Result<u32>;
    /// `glBindBuffer`; `0` unbinds.
    fn bind_buffer(&self, target: u32, buffer: u32);
    /// `glBindBufferBase`.
    fn bind_buffer_base(&self, target: u32, index: u32, buffer: u32);
    /// `glBufferData` with data.
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    /// `glBufferData` with a null pointer (allocate or orphan).
    fn buffer_data_size(&self, target: u32, size: usize, usage: u32);
    /// `glBufferSubData`.
    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]);
    /// `glMapBufferRange` on the buffer bound to `target`.
    fn map_buffer_range(
        &self,
        target: u32,
        offset: usize,
        length: usize,
        access: u32,
    ) -> Result<NonNull<u8>>;
    /// `glUnmapBuffer`; `false` when the store was corrupted while mapped or
    /// the unmap raised a GL error.
    fn unmap_buffer(&self, target: u32) -> bool;
    /// `glDeleteBuffers` for a single name.
    fn delete_buffer(&self, buffer: u32);

    /// `glVertexAttribPointer` sourcing from the bound `ARRAY_BUFFER`.
    fn vertex_attrib_pointer(
        &self,
        location: u32,
        components: i32,
        component_type: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    );
    /// `glVertexAttribPointer` sourcing from client memory.
    fn vertex_attrib_client_pointer(
        &self,
        location: u32,
        components: i32,
        component_type: u32,
        normalized: bool,
        stride: i32,
        data: &[u8],
    );
    /// `glEnableVertexAttribArray`.
    fn enable_vertex_attrib_array(&self, location: u32);
    /// `glDisableVertexAttribArray`.
    fn disable_vertex_attrib_array(&self, location: u32);

    /// `glDrawArrays`.
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    /// `glDrawElements` sourcing from the bound `ELEMENT_ARRAY_BUFFER`.
    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: usize);
    /// `glGetIntegerv` for a single value.
    fn get_integer(&self, parameter: u32) -> i32;
    /// `glReadPixels` into `out`.
    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        pixel_type: u32,
        out: &mut [u8],
    );
}

/// Convert a byte count to the `i32` GL expects.
pub(crate) fn gl_i32(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        crate::error::Error::invalid_argument(format!("{value} exceeds the GL size range"))
    })
}
