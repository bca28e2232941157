//! [`Gpu`] over a [`glow::Context`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::ptr::NonNull;
use std::sync::Arc;

use glow::HasContext;

use super::{parse_glsl_version, ContextInfo, GlProfile, GlVersion, Gpu};
use crate::error::{Error, Result};

/// A [`Gpu`] issuing real GL calls through glow.
///
/// Client-memory attribute pointers do not exist in core profiles, so
/// [`Gpu::vertex_attrib_client_pointer`] streams the bytes into a scratch
/// buffer owned by this object (one per attribute location) and points the
/// attribute at it. That call leaves `ARRAY_BUFFER` unbound.
pub struct GlowGpu {
    gl: Arc<glow::Context>,
    info: ContextInfo,
    client_streams: RefCell<HashMap<u32, glow::NativeBuffer>>,
}

impl GlowGpu {
    /// Wrap a glow context and query its profile and capabilities.
    ///
    /// # Safety
    ///
    /// `gl` must be current on the calling thread, and every later call on
    /// the returned object must happen on that thread while the context is
    /// still current. [`destroy`](Self::destroy) must run before the context
    /// goes away.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Self {
        let info = unsafe { query_info(&gl) };
        log::debug!("GL context: {} {}, GLSL {}", info.profile(), info.version(), info.glsl_version());
        Self {
            gl,
            info,
            client_streams: RefCell::new(HashMap::new()),
        }
    }

    /// The underlying glow context.
    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    /// Delete the scratch buffers used for client-memory attributes.
    pub fn destroy(&self) {
        for (_, buffer) in self.client_streams.borrow_mut().drain() {
            unsafe { self.gl.delete_buffer(buffer) };
        }
    }
}

unsafe fn query_info(gl: &glow::Context) -> ContextInfo {
    let version = gl.version();
    let api = GlVersion::new(version.major, version.minor);
    let profile = if version.is_embedded {
        if version.major >= 3 {
            GlProfile::Es3
        } else {
            GlProfile::Es2
        }
    } else if api >= GlVersion::new(3, 2) {
        let mask = unsafe { gl.get_parameter_i32(glow::CONTEXT_PROFILE_MASK) };
        // GL bitmask constants fit in i32.
        #[expect(clippy::cast_possible_wrap)]
        let core_bit = glow::CONTEXT_CORE_PROFILE_BIT as i32;
        if mask & core_bit != 0 {
            GlProfile::GlCore
        } else {
            GlProfile::GlCompat
        }
    } else {
        GlProfile::GlCompat
    };

    let default_info = match profile {
        GlProfile::Es2 => ContextInfo::es2(),
        GlProfile::Es3 => ContextInfo::es3(api.minor),
        GlProfile::GlCore => ContextInfo::gl_core(api.major, api.minor),
        GlProfile::GlCompat => ContextInfo::gl_compat(api.major, api.minor),
    };
    let glsl_text = unsafe { gl.get_parameter_string(glow::SHADING_LANGUAGE_VERSION) };
    let glsl = parse_glsl_version(&glsl_text).unwrap_or(default_info.glsl_version());
    let compiler = !profile.is_es() || unsafe { gl.get_parameter_i32(glow::SHADER_COMPILER) } != 0;

    default_info
        .with_glsl_version(glsl)
        .with_shader_compiler(compiler)
}

fn shader(name: u32) -> Option<glow::NativeShader> {
    NonZeroU32::new(name).map(glow::NativeShader)
}

fn program(name: u32) -> Option<glow::NativeProgram> {
    NonZeroU32::new(name).map(glow::NativeProgram)
}

fn buffer(name: u32) -> Option<glow::NativeBuffer> {
    NonZeroU32::new(name).map(glow::NativeBuffer)
}

fn uniform(location: i32) -> Option<glow::NativeUniformLocation> {
    u32::try_from(location).ok().map(glow::NativeUniformLocation)
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl Gpu for GlowGpu {
    fn info(&self) -> &ContextInfo {
        &self.info
    }

    fn create_shader(&self, stage: u32) -> Result<u32> {
        let shader = unsafe { self.gl.create_shader(stage) }.map_err(Error::Gpu)?;
        Ok(shader.0.get())
    }

    fn shader_source(&self, name: u32, source: &str) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.shader_source(s, source) };
        }
    }

    fn compile_shader(&self, name: u32) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.compile_shader(s) };
        }
    }

    fn shader_compile_status(&self, name: u32) -> bool {
        shader(name).is_some_and(|s| unsafe { self.gl.get_shader_compile_status(s) })
    }

    fn shader_info_log(&self, name: u32) -> String {
        shader(name)
            .map(|s| unsafe { self.gl.get_shader_info_log(s) })
            .unwrap_or_default()
    }

    fn delete_shader(&self, name: u32) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.delete_shader(s) };
        }
    }

    fn shader_binary_formats(&self) -> Vec<u32> {
        let count = unsafe { self.gl.get_parameter_i32(glow::NUM_SHADER_BINARY_FORMATS) };
        let Ok(count) = usize::try_from(count) else {
            return Vec::new();
        };
        if count == 0 {
            return Vec::new();
        }
        let mut formats = vec![0_i32; count];
        unsafe {
            self.gl
                .get_parameter_i32_slice(glow::SHADER_BINARY_FORMATS, &mut formats);
        }
        formats
            .into_iter()
            .filter_map(|f| u32::try_from(f).ok())
            .collect()
    }

    fn shader_binary(&self, _shaders: &[u32], format: u32, _binary: &[u8]) -> Result<()> {
        Err(Error::Gpu(format!(
            "glShaderBinary (format {format:#x}) is not exposed by the glow backend"
        )))
    }

    fn create_program(&self) -> Result<u32> {
        let program = unsafe { self.gl.create_program() }.map_err(Error::Gpu)?;
        Ok(program.0.get())
    }

    fn attach_shader(&self, p: u32, s: u32) {
        if let (Some(p), Some(s)) = (program(p), shader(s)) {
            unsafe { self.gl.attach_shader(p, s) };
        }
    }

    fn detach_shader(&self, p: u32, s: u32) {
        if let (Some(p), Some(s)) = (program(p), shader(s)) {
            unsafe { self.gl.detach_shader(p, s) };
        }
    }

    fn bind_attrib_location(&self, p: u32, location: u32, name: &str) {
        if let Some(p) = program(p) {
            unsafe { self.gl.bind_attrib_location(p, location, name) };
        }
    }

    fn link_program(&self, p: u32) {
        if let Some(p) = program(p) {
            unsafe { self.gl.link_program(p) };
        }
    }

    fn program_link_status(&self, p: u32) -> bool {
        program(p).is_some_and(|p| unsafe { self.gl.get_program_link_status(p) })
    }

    fn program_info_log(&self, p: u32) -> String {
        program(p)
            .map(|p| unsafe { self.gl.get_program_info_log(p) })
            .unwrap_or_default()
    }

    fn use_program(&self, p: u32) {
        unsafe { self.gl.use_program(program(p)) };
    }

    fn delete_program(&self, p: u32) {
        if let Some(p) = program(p) {
            unsafe { self.gl.delete_program(p) };
        }
    }

    fn attrib_location(&self, p: u32, name: &str) -> i32 {
        program(p)
            .and_then(|p| unsafe { self.gl.get_attrib_location(p, name) })
            .and_then(|loc| i32::try_from(loc).ok())
            .unwrap_or(-1)
    }

    fn uniform_location(&self, p: u32, name: &str) -> i32 {
        program(p)
            .and_then(|p| unsafe { self.gl.get_uniform_location(p, name) })
            .and_then(|loc| i32::try_from(loc.0).ok())
            .unwrap_or(-1)
    }

    fn uniform_block_index(&self, p: u32, name: &str) -> Option<u32> {
        program(p).and_then(|p| unsafe { self.gl.get_uniform_block_index(p, name) })
    }

    fn uniform_block_binding(&self, p: u32, block_index: u32, binding: u32) {
        if let Some(p) = program(p) {
            unsafe { self.gl.uniform_block_binding(p, block_index, binding) };
        }
    }

    fn uniform_f32(&self, location: i32, components: usize, values: &[f32]) {
        let loc = uniform(location);
        let loc = loc.as_ref();
        unsafe {
            match components {
                1 => self.gl.uniform_1_f32_slice(loc, values),
                2 => self.gl.uniform_2_f32_slice(loc, values),
                3 => self.gl.uniform_3_f32_slice(loc, values),
                4 => self.gl.uniform_4_f32_slice(loc, values),
                n => log::warn!("uniform_f32: unsupported component count {n}"),
            }
        }
    }

    fn uniform_i32(&self, location: i32, components: usize, values: &[i32]) {
        let loc = uniform(location);
        let loc = loc.as_ref();
        unsafe {
            match components {
                1 => self.gl.uniform_1_i32_slice(loc, values),
                2 => self.gl.uniform_2_i32_slice(loc, values),
                3 => self.gl.uniform_3_i32_slice(loc, values),
                4 => self.gl.uniform_4_i32_slice(loc, values),
                n => log::warn!("uniform_i32: unsupported component count {n}"),
            }
        }
    }

    fn uniform_matrix_f32(&self, location: i32, dim: usize, transpose: bool, values: &[f32]) {
        let loc = uniform(location);
        let loc = loc.as_ref();
        unsafe {
            match dim {
                2 => self.gl.uniform_matrix_2_f32_slice(loc, transpose, values),
                3 => self.gl.uniform_matrix_3_f32_slice(loc, transpose, values),
                4 => self.gl.uniform_matrix_4_f32_slice(loc, transpose, values),
                n => log::warn!("uniform_matrix_f32: unsupported dimension {n}"),
            }
        }
    }

    fn create_buffer(&self) -> Result<u32> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(Error::Gpu)?;
        Ok(buffer.0.get())
    }

    fn bind_buffer(&self, target: u32, name: u32) {
        unsafe { self.gl.bind_buffer(target, buffer(name)) };
    }

    fn bind_buffer_base(&self, target: u32, index: u32, name: u32) {
        unsafe { self.gl.bind_buffer_base(target, index, buffer(name)) };
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) };
    }

    fn buffer_data_size(&self, target: u32, size: usize, usage: u32) {
        unsafe { self.gl.buffer_data_size(target, saturating_i32(size), usage) };
    }

    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]) {
        unsafe {
            self.gl
                .buffer_sub_data_u8_slice(target, saturating_i32(offset), data);
        }
    }

    fn map_buffer_range(
        &self,
        target: u32,
        offset: usize,
        length: usize,
        access: u32,
    ) -> Result<NonNull<u8>> {
        let ptr = unsafe {
            self.gl.map_buffer_range(
                target,
                saturating_i32(offset),
                saturating_i32(length),
                access,
            )
        };
        NonNull::new(ptr).ok_or_else(|| {
            Error::Gpu(format!(
                "glMapBufferRange(target {target:#x}, offset {offset}, length {length}) returned null"
            ))
        })
    }

    fn unmap_buffer(&self, target: u32) -> bool {
        // glow drops the GL_FALSE result of glUnmapBuffer, so a lost store
        // is only seen through the error it leaves behind
        unsafe {
            for _ in 0..8 {
                if self.gl.get_error() == glow::NO_ERROR {
                    break;
                }
            }
            self.gl.unmap_buffer(target);
            self.gl.get_error() == glow::NO_ERROR
        }
    }

    fn delete_buffer(&self, name: u32) {
        if let Some(b) = buffer(name) {
            unsafe { self.gl.delete_buffer(b) };
        }
    }

    fn vertex_attrib_pointer(
        &self,
        location: u32,
        components: i32,
        component_type: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                location,
                components,
                component_type,
                normalized,
                stride,
                saturating_i32(offset),
            );
        }
    }

    fn vertex_attrib_client_pointer(
        &self,
        location: u32,
        components: i32,
        component_type: u32,
        normalized: bool,
        stride: i32,
        data: &[u8],
    ) {
        let mut streams = self.client_streams.borrow_mut();
        let stream = match streams.get(&location) {
            Some(b) => *b,
            None => match unsafe { self.gl.create_buffer() } {
                Ok(b) => *streams.entry(location).or_insert(b),
                Err(err) => {
                    log::error!("client attribute stream for location {location}: {err}");
                    return;
                }
            },
        };
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(stream));
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STREAM_DRAW);
            self.gl.vertex_attrib_pointer_f32(
                location,
                components,
                component_type,
                normalized,
                stride,
                0,
            );
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(location) };
    }

    fn disable_vertex_attrib_array(&self, location: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(location) };
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode, first, count) };
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: usize) {
        unsafe {
            self.gl
                .draw_elements(mode, count, element_type, saturating_i32(offset));
        }
    }

    fn get_integer(&self, parameter: u32) -> i32 {
        unsafe { self.gl.get_parameter_i32(parameter) }
    }

    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        pixel_type: u32,
        out: &mut [u8],
    ) {
        unsafe {
            self.gl.read_pixels(
                x,
                y,
                width,
                height,
                format,
                pixel_type,
                glow::PixelPackData::Slice(Some(out)),
            );
        }
    }
}
