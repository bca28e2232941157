//! A recording fake [`Gpu`] for unit tests.
//!
//! Compiles any source that does not contain `#error`, links programs whose
//! stages all compiled, and assigns attribute and uniform locations by
//! scanning declarations: pre-link `bind_attrib_location` calls win, then
//! overrides registered with [`MockGpu::set_attrib_override`], then the next
//! free slot in declaration order. Every call is recorded.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;

use super::{ContextInfo, Gpu};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateShader { stage: u32, shader: u32 },
    ShaderSource { shader: u32, source: String },
    CompileShader(u32),
    DeleteShader(u32),
    ShaderBinary { format: u32, len: usize },
    CreateProgram(u32),
    AttachShader { program: u32, shader: u32 },
    DetachShader { program: u32, shader: u32 },
    BindAttribLocation { program: u32, location: u32, name: String },
    LinkProgram(u32),
    UseProgram(u32),
    DeleteProgram(u32),
    UniformBlockBinding { program: u32, index: u32, binding: u32 },
    UniformF32 { location: i32, components: usize, values: Vec<f32> },
    UniformI32 { location: i32, components: usize, values: Vec<i32> },
    UniformMatrix { location: i32, dim: usize, values: Vec<f32> },
    CreateBuffer(u32),
    BindBuffer { target: u32, buffer: u32 },
    BindBufferBase { target: u32, index: u32, buffer: u32 },
    BufferData { target: u32, len: usize, usage: u32 },
    BufferDataSize { target: u32, size: usize, usage: u32 },
    BufferSubData { target: u32, offset: usize, len: usize },
    MapBufferRange { target: u32, offset: usize, length: usize },
    UnmapBuffer(u32),
    DeleteBuffer(u32),
    VertexAttribPointer {
        location: u32,
        components: i32,
        component_type: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    },
    VertexAttribClientPointer { location: u32, components: i32, stride: i32, len: usize },
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    DrawArrays { mode: u32, first: i32, count: i32 },
    DrawElements { mode: u32, count: i32, element_type: u32, offset: usize },
    ReadPixels { width: i32, height: i32, format: u32, pixel_type: u32 },
}

#[derive(Default)]
struct MockShader {
    stage: u32,
    source: String,
    compiled: bool,
}

#[derive(Default)]
struct MockProgram {
    shaders: Vec<u32>,
    bound: HashMap<String, i32>,
    attribs: HashMap<String, i32>,
    uniforms: HashMap<String, i32>,
    blocks: HashMap<String, u32>,
    linked: bool,
    log: String,
}

#[derive(Default)]
struct MockState {
    next_name: u32,
    calls: Vec<Call>,
    shaders: HashMap<u32, MockShader>,
    programs: HashMap<u32, MockProgram>,
    attrib_overrides: HashMap<String, i32>,
    integers: HashMap<u32, i32>,
    bound: HashMap<u32, u32>,
    buffers: HashMap<u32, Vec<u8>>,
    mapped: HashMap<u32, (usize, Vec<u8>)>,
    enabled_arrays: HashSet<u32>,
    binary_formats: Vec<u32>,
    framebuffer: Vec<u8>,
    lose_mapped_stores: bool,
}

pub(crate) struct MockGpu {
    info: ContextInfo,
    state: RefCell<MockState>,
}

impl MockGpu {
    pub(crate) fn new(info: ContextInfo) -> Self {
        let mut state = MockState {
            next_name: 1,
            ..MockState::default()
        };
        state.integers.insert(glow::PACK_ALIGNMENT, 4);
        state.integers.insert(glow::UNPACK_ALIGNMENT, 4);
        Self {
            info,
            state: RefCell::new(state),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn set_integer(&self, parameter: u32, value: i32) {
        self.state.borrow_mut().integers.insert(parameter, value);
    }

    /// Attribute `name` gets `location` in every program linked afterwards.
    pub(crate) fn set_attrib_override(&self, name: &str, location: i32) {
        self.state
            .borrow_mut()
            .attrib_overrides
            .insert(name.to_string(), location);
    }

    pub(crate) fn set_binary_formats(&self, formats: Vec<u32>) {
        self.state.borrow_mut().binary_formats = formats;
    }

    pub(crate) fn set_lose_mapped_stores(&self, lose: bool) {
        self.state.borrow_mut().lose_mapped_stores = lose;
    }

    pub(crate) fn set_framebuffer(&self, bytes: Vec<u8>) {
        self.state.borrow_mut().framebuffer = bytes;
    }

    pub(crate) fn buffer_contents(&self, buffer: u32) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer).cloned()
    }

    pub(crate) fn is_array_enabled(&self, location: u32) -> bool {
        self.state.borrow().enabled_arrays.contains(&location)
    }

    pub(crate) fn shader_exists(&self, shader: u32) -> bool {
        self.state.borrow().shaders.contains_key(&shader)
    }

    pub(crate) fn program_exists(&self, program: u32) -> bool {
        self.state.borrow().programs.contains_key(&program)
    }

    pub(crate) fn buffer_exists(&self, buffer: u32) -> bool {
        self.state.borrow().buffers.contains_key(&buffer)
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn alloc_name(&self) -> u32 {
        let mut state = self.state.borrow_mut();
        let name = state.next_name;
        state.next_name += 1;
        name
    }
}

/// Names declared with `qualifier` (`attribute`, `in`, `uniform`), in order.
fn declarations(source: &str, qualifier: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines() {
        let line = line.split("//").next().unwrap_or_default().trim();
        if line.starts_with('#') {
            continue;
        }
        for stmt in line.split(';') {
            let tokens: Vec<&str> = stmt.split_whitespace().collect();
            let Some(pos) = tokens.iter().position(|t| *t == qualifier) else {
                continue;
            };
            if tokens[pos + 1..].iter().any(|t| t.contains('{')) {
                continue;
            }
            if tokens.len() >= pos + 3 {
                if let Some(name) = tokens.last().and_then(|t| t.split('[').next()) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

/// Uniform block names (`uniform Name {`).
fn uniform_blocks(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            (tokens.next()? == "uniform").then_some(())?;
            let name = tokens.next()?;
            let rest: String = tokens.collect();
            (name.ends_with('{') || rest.starts_with('{'))
                .then(|| name.trim_end_matches('{').to_string())
        })
        .collect()
}

impl Gpu for MockGpu {
    fn info(&self) -> &ContextInfo {
        &self.info
    }

    fn create_shader(&self, stage: u32) -> Result<u32> {
        let shader = self.alloc_name();
        self.state.borrow_mut().shaders.insert(
            shader,
            MockShader {
                stage,
                ..MockShader::default()
            },
        );
        self.record(Call::CreateShader { stage, shader });
        Ok(shader)
    }

    fn shader_source(&self, shader: u32, source: &str) {
        if let Some(s) = self.state.borrow_mut().shaders.get_mut(&shader) {
            s.source = source.to_string();
        }
        self.record(Call::ShaderSource {
            shader,
            source: source.to_string(),
        });
    }

    fn compile_shader(&self, shader: u32) {
        if let Some(s) = self.state.borrow_mut().shaders.get_mut(&shader) {
            s.compiled = !s.source.contains("#error");
        }
        self.record(Call::CompileShader(shader));
    }

    fn shader_compile_status(&self, shader: u32) -> bool {
        self.state
            .borrow()
            .shaders
            .get(&shader)
            .is_some_and(|s| s.compiled)
    }

    fn shader_info_log(&self, shader: u32) -> String {
        match self.state.borrow().shaders.get(&shader) {
            Some(s) if !s.compiled => "0:1(1): error: #error directive\n".to_string(),
            _ => String::new(),
        }
    }

    fn delete_shader(&self, shader: u32) {
        self.state.borrow_mut().shaders.remove(&shader);
        self.record(Call::DeleteShader(shader));
    }

    fn shader_binary_formats(&self) -> Vec<u32> {
        self.state.borrow().binary_formats.clone()
    }

    fn shader_binary(&self, shaders: &[u32], format: u32, binary: &[u8]) -> Result<()> {
        self.record(Call::ShaderBinary {
            format,
            len: binary.len(),
        });
        let mut state = self.state.borrow_mut();
        if !state.binary_formats.contains(&format) {
            return Err(Error::Gpu(format!("binary format {format:#x} not supported")));
        }
        for shader in shaders {
            if let Some(s) = state.shaders.get_mut(shader) {
                s.compiled = true;
            }
        }
        Ok(())
    }

    fn create_program(&self) -> Result<u32> {
        let program = self.alloc_name();
        self.state
            .borrow_mut()
            .programs
            .insert(program, MockProgram::default());
        self.record(Call::CreateProgram(program));
        Ok(program)
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            if !p.shaders.contains(&shader) {
                p.shaders.push(shader);
            }
        }
        self.record(Call::AttachShader { program, shader });
    }

    fn detach_shader(&self, program: u32, shader: u32) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.shaders.retain(|s| *s != shader);
        }
        self.record(Call::DetachShader { program, shader });
    }

    fn bind_attrib_location(&self, program: u32, location: u32, name: &str) {
        if let Some(p) = self.state.borrow_mut().programs.get_mut(&program) {
            p.bound
                .insert(name.to_string(), i32::try_from(location).unwrap_or(-1));
        }
        self.record(Call::BindAttribLocation {
            program,
            location,
            name: name.to_string(),
        });
    }

    fn link_program(&self, program: u32) {
        self.record(Call::LinkProgram(program));
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(p) = state.programs.get_mut(&program) else {
            return;
        };

        let stages: Vec<&MockShader> = p
            .shaders
            .iter()
            .filter_map(|s| state.shaders.get(s))
            .collect();
        if stages.is_empty() || stages.iter().any(|s| !s.compiled) {
            p.linked = false;
            p.log = "error: no valid shaders attached\n".to_string();
            return;
        }

        let mut attrib_names = Vec::new();
        let mut uniform_names = Vec::new();
        let mut block_names = Vec::new();
        for stage in &stages {
            if stage.stage == glow::VERTEX_SHADER {
                attrib_names.extend(declarations(&stage.source, "attribute"));
                attrib_names.extend(declarations(&stage.source, "in"));
            }
            uniform_names.extend(declarations(&stage.source, "uniform"));
            block_names.extend(uniform_blocks(&stage.source));
        }

        p.attribs.clear();
        let mut used: HashSet<i32> = HashSet::new();
        for name in &attrib_names {
            let fixed = p
                .bound
                .get(name)
                .or_else(|| state.attrib_overrides.get(name))
                .copied();
            if let Some(loc) = fixed {
                p.attribs.insert(name.clone(), loc);
                used.insert(loc);
            }
        }
        let mut next = 0;
        for name in attrib_names {
            if p.attribs.contains_key(&name) {
                continue;
            }
            while used.contains(&next) {
                next += 1;
            }
            used.insert(next);
            p.attribs.insert(name, next);
        }

        p.uniforms.clear();
        for name in uniform_names {
            let loc = i32::try_from(p.uniforms.len()).unwrap_or(i32::MAX);
            p.uniforms.entry(name).or_insert(loc);
        }
        p.blocks.clear();
        for name in block_names {
            let index = u32::try_from(p.blocks.len()).unwrap_or(u32::MAX);
            p.blocks.entry(name).or_insert(index);
        }
        p.linked = true;
        p.log.clear();
    }

    fn program_link_status(&self, program: u32) -> bool {
        self.state
            .borrow()
            .programs
            .get(&program)
            .is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: u32) -> String {
        self.state
            .borrow()
            .programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn use_program(&self, program: u32) {
        self.record(Call::UseProgram(program));
    }

    fn delete_program(&self, program: u32) {
        self.state.borrow_mut().programs.remove(&program);
        self.record(Call::DeleteProgram(program));
    }

    fn attrib_location(&self, program: u32, name: &str) -> i32 {
        self.state
            .borrow()
            .programs
            .get(&program)
            .filter(|p| p.linked)
            .and_then(|p| p.attribs.get(name).copied())
            .unwrap_or(-1)
    }

    fn uniform_location(&self, program: u32, name: &str) -> i32 {
        self.state
            .borrow()
            .programs
            .get(&program)
            .filter(|p| p.linked)
            .and_then(|p| p.uniforms.get(name).copied())
            .unwrap_or(-1)
    }

    fn uniform_block_index(&self, program: u32, name: &str) -> Option<u32> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.blocks.get(name).copied())
    }

    fn uniform_block_binding(&self, program: u32, index: u32, binding: u32) {
        self.record(Call::UniformBlockBinding {
            program,
            index,
            binding,
        });
    }

    fn uniform_f32(&self, location: i32, components: usize, values: &[f32]) {
        self.record(Call::UniformF32 {
            location,
            components,
            values: values.to_vec(),
        });
    }

    fn uniform_i32(&self, location: i32, components: usize, values: &[i32]) {
        self.record(Call::UniformI32 {
            location,
            components,
            values: values.to_vec(),
        });
    }

    fn uniform_matrix_f32(&self, location: i32, dim: usize, _transpose: bool, values: &[f32]) {
        self.record(Call::UniformMatrix {
            location,
            dim,
            values: values.to_vec(),
        });
    }

    fn create_buffer(&self) -> Result<u32> {
        let buffer = self.alloc_name();
        self.state.borrow_mut().buffers.insert(buffer, Vec::new());
        self.record(Call::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn bind_buffer(&self, target: u32, buffer: u32) {
        self.state.borrow_mut().bound.insert(target, buffer);
        self.record(Call::BindBuffer { target, buffer });
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: u32) {
        self.record(Call::BindBufferBase {
            target,
            index,
            buffer,
        });
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        {
            let mut state = self.state.borrow_mut();
            let bound = state.bound.get(&target).copied().unwrap_or(0);
            if let Some(store) = state.buffers.get_mut(&bound) {
                *store = data.to_vec();
            }
        }
        self.record(Call::BufferData {
            target,
            len: data.len(),
            usage,
        });
    }

    fn buffer_data_size(&self, target: u32, size: usize, usage: u32) {
        {
            let mut state = self.state.borrow_mut();
            let bound = state.bound.get(&target).copied().unwrap_or(0);
            if let Some(store) = state.buffers.get_mut(&bound) {
                *store = vec![0; size];
            }
        }
        self.record(Call::BufferDataSize {
            target,
            size,
            usage,
        });
    }

    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]) {
        {
            let mut state = self.state.borrow_mut();
            let bound = state.bound.get(&target).copied().unwrap_or(0);
            if let Some(store) = state.buffers.get_mut(&bound) {
                if store.len() < offset + data.len() {
                    store.resize(offset + data.len(), 0);
                }
                store[offset..offset + data.len()].copy_from_slice(data);
            }
        }
        self.record(Call::BufferSubData {
            target,
            offset,
            len: data.len(),
        });
    }

    fn map_buffer_range(
        &self,
        target: u32,
        offset: usize,
        length: usize,
        _access: u32,
    ) -> Result<NonNull<u8>> {
        self.record(Call::MapBufferRange {
            target,
            offset,
            length,
        });
        let mut state = self.state.borrow_mut();
        let bound = state.bound.get(&target).copied().unwrap_or(0);
        if bound == 0 || state.mapped.contains_key(&bound) {
            return Err(Error::Gpu("nothing mappable bound".to_string()));
        }
        let store = state.buffers.get(&bound).cloned().unwrap_or_default();
        if offset + length > store.len() {
            return Err(Error::Gpu("map range out of bounds".to_string()));
        }
        let mut mapping = store[offset..offset + length].to_vec();
        let ptr = NonNull::new(mapping.as_mut_ptr())
            .ok_or_else(|| Error::Gpu("empty mapping".to_string()))?;
        state.mapped.insert(bound, (offset, mapping));
        Ok(ptr)
    }

    fn unmap_buffer(&self, target: u32) -> bool {
        self.record(Call::UnmapBuffer(target));
        let mut state = self.state.borrow_mut();
        let bound = state.bound.get(&target).copied().unwrap_or(0);
        let Some((offset, bytes)) = state.mapped.remove(&bound) else {
            return false;
        };
        if state.lose_mapped_stores {
            return false;
        }
        if let Some(store) = state.buffers.get_mut(&bound) {
            store[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }
        true
    }

    fn delete_buffer(&self, buffer: u32) {
        self.state.borrow_mut().buffers.remove(&buffer);
        self.record(Call::DeleteBuffer(buffer));
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
        self.record(Call::VertexAttribPointer {
            location,
            components,
            component_type,
            normalized,
            stride,
            offset,
        });
    }

    fn vertex_attrib_client_pointer(
        &self,
        location: u32,
        components: i32,
        _component_type: u32,
        _normalized: bool,
        stride: i32,
        data: &[u8],
    ) {
        self.record(Call::VertexAttribClientPointer {
            location,
            components,
            stride,
            len: data.len(),
        });
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        self.state.borrow_mut().enabled_arrays.insert(location);
        self.record(Call::EnableVertexAttribArray(location));
    }

    fn disable_vertex_attrib_array(&self, location: u32) {
        self.state.borrow_mut().enabled_arrays.remove(&location);
        self.record(Call::DisableVertexAttribArray(location));
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.record(Call::DrawArrays { mode, first, count });
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: usize) {
        self.record(Call::DrawElements {
            mode,
            count,
            element_type,
            offset,
        });
    }

    fn get_integer(&self, parameter: u32) -> i32 {
        self.state
            .borrow()
            .integers
            .get(&parameter)
            .copied()
            .unwrap_or(0)
    }

    fn read_pixels(
        &self,
        _x: i32,
        _y: i32,
        width: i32,
        height: i32,
        format: u32,
        pixel_type: u32,
        out: &mut [u8],
    ) {
        {
            let state = self.state.borrow();
            let n = out.len().min(state.framebuffer.len());
            out[..n].copy_from_slice(&state.framebuffer[..n]);
        }
        self.record(Call::ReadPixels {
            width,
            height,
            format,
            pixel_type,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_scan() {
        let src = "#define attribute in\nattribute vec3 p; void main(){gl_Position=vec4(p,1);}\n\
                   in vec2 uv[2];\nuniform mat4 mvp; // matrix\n";
        assert_eq!(declarations(src, "attribute"), vec!["p"]);
        assert_eq!(declarations(src, "in"), vec!["uv"]);
        assert_eq!(declarations(src, "uniform"), vec!["mvp"]);
        assert_eq!(uniform_blocks("uniform Lights {\n vec4 c;\n};"), vec!["Lights"]);
    }

    #[test]
    fn test_link_assigns_bound_locations_first() {
        let gpu = MockGpu::new(ContextInfo::es2());
        let vs = gpu.create_shader(glow::VERTEX_SHADER).expect("vs");
        gpu.shader_source(vs, "attribute vec3 a;\nattribute vec3 b;\n");
        gpu.compile_shader(vs);
        let p = gpu.create_program().expect("program");
        gpu.attach_shader(p, vs);
        gpu.bind_attrib_location(p, 0, "b");
        gpu.link_program(p);
        assert!(gpu.program_link_status(p));
        assert_eq!(gpu.attrib_location(p, "b"), 0);
        assert_eq!(gpu.attrib_location(p, "a"), 1);
    }
}
