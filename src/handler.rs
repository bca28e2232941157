//! Strategies that feed an attribute stream to the pipeline.
//!
//! [`AttributeHandler`] is a closed set: plain data buffers (indices), a
//! single GLSL attribute, and an interleaved parent whose sub-arrays are
//! pointed at slices of one shared VBO. [`GlArrayData::enable_buffer`]
//! dispatches to the variant it was built with.
//!
//! [`GlArrayData::enable_buffer`]: crate::array_data::GlArrayData::enable_buffer

use crate::array_data::ArrayData;
use crate::error::{Error, Result};
use crate::gpu::{gl_i32, Gpu};
use crate::shader::ShaderState;

/// How a stream is bound and enabled.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeHandler {
    /// Non-attribute VBO data such as an index buffer: bind and upload on
    /// enable, unbind on disable.
    GenericData,
    /// One GLSL vertex attribute.
    GlslSingle,
    /// The parent of interleaved GLSL sub-arrays sharing one VBO.
    GlslInterleaved {
        /// Sub-array descriptions, in the order they were added.
        subs: Vec<ArrayData>,
    },
}

/// The parts of a [`GlArrayData`](crate::array_data::GlArrayData) a handler
/// works on.
pub(crate) struct Stream<'a> {
    pub(crate) desc: &'a mut ArrayData,
    /// Sealed CPU data to upload; `None` for mapped storage.
    pub(crate) bytes: Option<&'a [u8]>,
    pub(crate) written_to_vbo: &'a mut bool,
}

impl AttributeHandler {
    /// Sub-arrays of an interleaved parent; empty for the other variants.
    pub fn sub_arrays(&self) -> &[ArrayData] {
        match self {
            Self::GlslInterleaved { subs } => subs,
            _ => &[],
        }
    }

    pub(crate) fn sub_arrays_mut(&mut self) -> Option<&mut Vec<ArrayData>> {
        match self {
            Self::GlslInterleaved { subs } => Some(subs),
            _ => None,
        }
    }

    /// Whether this handler resolves attribute locations.
    pub fn is_glsl(&self) -> bool {
        !matches!(self, Self::GenericData)
    }

    pub(crate) fn enable_state(
        &mut self,
        gpu: &dyn Gpu,
        state: Option<&mut ShaderState>,
        mut stream: Stream<'_>,
        enable: bool,
    ) -> Result<()> {
        match self {
            Self::GenericData => {
                if !stream.desc.uses_vbo() {
                    return Err(Error::invalid_state(format!(
                        "{}: data arrays must be VBO backed",
                        stream.desc.name()
                    )));
                }
                bind_stream(gpu, &mut stream, enable);
                Ok(())
            }
            Self::GlslSingle => enable_single(gpu, state, stream, enable),
            Self::GlslInterleaved { subs } => enable_interleaved(gpu, state, stream, subs, enable),
        }
    }
}

/// Bind (uploading pending CPU data) or unbind the stream's VBO.
///
/// Returns `true` iff the stream uses a VBO.
pub(crate) fn bind_stream(gpu: &dyn Gpu, stream: &mut Stream<'_>, bind: bool) -> bool {
    if !stream.desc.uses_vbo() {
        return false;
    }
    let vbo = *stream.desc.vbo();
    let target = vbo.target.to_gl();
    if bind {
        gpu.bind_buffer(target, vbo.name);
        if !*stream.written_to_vbo {
            if let Some(bytes) = stream.bytes {
                log::debug!("upload {} bytes to vbo {} ({})", bytes.len(), vbo.name, stream.desc.name());
                gpu.buffer_data(target, bytes, vbo.usage.to_gl());
            }
            *stream.written_to_vbo = true;
        }
    } else {
        gpu.bind_buffer(target, 0);
    }
    true
}

/// Issue `glVertexAttribPointer` for `desc` at `location`, sourcing from the
/// bound VBO at the stream's offset.
pub(crate) fn attrib_pointer(gpu: &dyn Gpu, location: u32, desc: &ArrayData) -> Result<()> {
    gpu.vertex_attrib_pointer(
        location,
        gl_i32(desc.components())?,
        desc.component_type().to_gl(),
        desc.normalized(),
        gl_i32(desc.stride_bytes())?,
        desc.vbo().offset,
    );
    Ok(())
}

/// Issue a client-memory attribute pointer for `desc` at `location`.
pub(crate) fn attrib_client_pointer(
    gpu: &dyn Gpu,
    location: u32,
    desc: &ArrayData,
    bytes: &[u8],
) -> Result<()> {
    gpu.vertex_attrib_client_pointer(
        location,
        gl_i32(desc.components())?,
        desc.component_type().to_gl(),
        desc.normalized(),
        gl_i32(desc.stride_bytes())?,
        bytes,
    );
    Ok(())
}

fn fixed_location(desc: &ArrayData) -> Result<u32> {
    desc.location_u32().ok_or_else(|| {
        Error::invalid_state(format!(
            "{}: no location and no shader state to resolve it",
            desc.name()
        ))
    })
}

fn pointer(gpu: &dyn Gpu, state: Option<&mut ShaderState>, desc: &mut ArrayData) -> Result<()> {
    match state {
        Some(st) => st.vertex_attrib_pointer(gpu, desc).map(|_| ()),
        None => attrib_pointer(gpu, fixed_location(desc)?, desc),
    }
}

fn client_pointer(
    gpu: &dyn Gpu,
    state: Option<&mut ShaderState>,
    desc: &mut ArrayData,
    bytes: &[u8],
) -> Result<()> {
    match state {
        Some(st) => st.vertex_attrib_client_pointer(gpu, desc, bytes).map(|_| ()),
        None => attrib_client_pointer(gpu, fixed_location(desc)?, desc, bytes),
    }
}

fn toggle_array(
    gpu: &dyn Gpu,
    state: Option<&mut ShaderState>,
    desc: &mut ArrayData,
    enable: bool,
) -> Result<()> {
    match (state, enable) {
        (Some(st), true) => st.enable_vertex_attrib_array_data(gpu, desc).map(|_| ()),
        (Some(st), false) => st.disable_vertex_attrib_array_data(gpu, desc).map(|_| ()),
        (None, true) => {
            gpu.enable_vertex_attrib_array(fixed_location(desc)?);
            Ok(())
        }
        (None, false) => {
            gpu.disable_vertex_attrib_array(fixed_location(desc)?);
            Ok(())
        }
    }
}

fn enable_single(
    gpu: &dyn Gpu,
    mut state: Option<&mut ShaderState>,
    mut stream: Stream<'_>,
    enable: bool,
) -> Result<()> {
    if !enable {
        return toggle_array(gpu, state, stream.desc, false);
    }
    if bind_stream(gpu, &mut stream, true) {
        let result = pointer(gpu, state.as_deref_mut(), stream.desc);
        bind_stream(gpu, &mut stream, false);
        result?;
    } else if let Some(bytes) = stream.bytes {
        client_pointer(gpu, state.as_deref_mut(), stream.desc, bytes)?;
    } else {
        return Err(Error::invalid_state(format!(
            "{}: neither a VBO nor client data to source from",
            stream.desc.name()
        )));
    }
    toggle_array(gpu, state, stream.desc, true)
}

fn enable_interleaved(
    gpu: &dyn Gpu,
    mut state: Option<&mut ShaderState>,
    mut stream: Stream<'_>,
    subs: &mut [ArrayData],
    enable: bool,
) -> Result<()> {
    if !stream.desc.uses_vbo() {
        return Err(Error::invalid_state(format!(
            "{}: interleaved arrays must be VBO backed",
            stream.desc.name()
        )));
    }
    if !enable {
        return subs
            .iter_mut()
            .try_for_each(|sub| toggle_array(gpu, state.as_deref_mut(), sub, false));
    }
    bind_stream(gpu, &mut stream, true);
    let result = subs.iter_mut().try_for_each(|sub| {
        pointer(gpu, state.as_deref_mut(), sub)?;
        toggle_array(gpu, state.as_deref_mut(), sub, true)
    });
    bind_stream(gpu, &mut stream, false);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_data::{VboState, VboTarget, VboUsage};
    use crate::data_type::ComponentType;
    use crate::gpu::mock::{Call, MockGpu};
    use crate::gpu::ContextInfo;

    fn vbo_desc(name: &str, location: i32) -> ArrayData {
        let mut desc = ArrayData::new(
            name,
            2,
            ComponentType::Float,
            false,
            0,
            true,
            VboState::server(VboUsage::Static, VboTarget::Array),
        )
        .expect("valid");
        desc.set_vbo_name(5);
        desc.set_location(location);
        desc
    }

    #[test]
    fn test_single_without_state_uses_fixed_location() {
        let gpu = MockGpu::new(ContextInfo::gl_core(3, 3));
        let mut desc = vbo_desc("uv", 3);
        let bytes = [0u8; 16];
        let mut written = false;
        let stream = Stream {
            desc: &mut desc,
            bytes: Some(&bytes[..]),
            written_to_vbo: &mut written,
        };
        AttributeHandler::GlslSingle
            .enable_state(&gpu, None, stream, true)
            .expect("enable");
        assert!(written);
        assert_eq!(
            gpu.calls(),
            vec![
                Call::BindBuffer { target: glow::ARRAY_BUFFER, buffer: 5 },
                Call::BufferData { target: glow::ARRAY_BUFFER, len: 16, usage: glow::STATIC_DRAW },
                Call::VertexAttribPointer {
                    location: 3,
                    components: 2,
                    component_type: glow::FLOAT,
                    normalized: false,
                    stride: 8,
                    offset: 0,
                },
                Call::BindBuffer { target: glow::ARRAY_BUFFER, buffer: 0 },
                Call::EnableVertexAttribArray(3),
            ]
        );
    }

    #[test]
    fn test_single_without_location_fails() {
        let gpu = MockGpu::new(ContextInfo::gl_core(3, 3));
        let mut desc = vbo_desc("uv", -1);
        let mut written = true;
        let stream = Stream {
            desc: &mut desc,
            bytes: None,
            written_to_vbo: &mut written,
        };
        let result = AttributeHandler::GlslSingle.enable_state(&gpu, None, stream, true);
        assert!(matches!(result, Err(Error::InvalidState(_))));
        // The VBO is unbound again even though the pointer failed.
        assert_eq!(
            gpu.calls().last(),
            Some(&Call::BindBuffer { target: glow::ARRAY_BUFFER, buffer: 0 })
        );
    }

    #[test]
    fn test_generic_requires_vbo() {
        let gpu = MockGpu::new(ContextInfo::es2());
        let mut desc = vbo_desc("idx", -1);
        desc.clear_vbo();
        let mut written = false;
        let stream = Stream {
            desc: &mut desc,
            bytes: None,
            written_to_vbo: &mut written,
        };
        let result = AttributeHandler::GenericData.enable_state(&gpu, None, stream, true);
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert!(gpu.calls().is_empty());
    }
}
