//! The immutable description of one attribute stream.

use std::fmt;

use crate::data_type::ComponentType;
use crate::error::{Error, Result};

/// How often a VBO's contents are expected to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VboUsage {
    /// `GL_STATIC_DRAW`
    #[default]
    Static,
    /// `GL_DYNAMIC_DRAW`
    Dynamic,
    /// `GL_STREAM_DRAW`
    Stream,
}

impl VboUsage {
    /// The GL enum value.
    pub fn to_gl(self) -> u32 {
        match self {
            Self::Static => glow::STATIC_DRAW,
            Self::Dynamic => glow::DYNAMIC_DRAW,
            Self::Stream => glow::STREAM_DRAW,
        }
    }
}

/// Binding point of a VBO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VboTarget {
    /// `GL_ARRAY_BUFFER`, vertex attributes.
    #[default]
    Array,
    /// `GL_ELEMENT_ARRAY_BUFFER`, indices.
    ElementArray,
}

impl VboTarget {
    /// The GL enum value.
    pub fn to_gl(self) -> u32 {
        match self {
            Self::Array => glow::ARRAY_BUFFER,
            Self::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
        }
    }
}

/// VBO identity and placement of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VboState {
    /// Buffer name, `0` until allocated.
    pub name: u32,
    /// Byte offset of the first component inside the buffer.
    pub offset: usize,
    /// Usage hint.
    pub usage: VboUsage,
    /// Binding point.
    pub target: VboTarget,
    /// Whether the stream lives in a VBO at all.
    pub enabled: bool,
}

impl VboState {
    /// A VBO-backed stream that has not allocated its buffer yet.
    pub fn server(usage: VboUsage, target: VboTarget) -> Self {
        Self {
            usage,
            target,
            enabled: true,
            ..Self::default()
        }
    }
}

/// Description of one typed attribute stream.
///
/// This is what the shader state caches per attribute name, and what the
/// sub-arrays of an interleaved buffer are made of. A stream whose VBO is
/// enabled is sourced from `vbo().name` at `vbo().offset`; otherwise the
/// pointer is a client-memory one.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    name: String,
    location: i32,
    components: usize,
    component_type: ComponentType,
    normalized: bool,
    stride_bytes: usize,
    vertex_attribute: bool,
    vbo: VboState,
}

impl ArrayData {
    /// Validate and build a description.
    ///
    /// A `stride_bytes` of `0` means tightly packed
    /// (`components * bytes_per_component`).
    ///
    /// # Errors
    ///
    /// *invalid-argument* when `components` is `0` (or above `4` for a vertex
    /// attribute; interleaved parents and data streams may be wider), the stride is
    /// smaller than one element or not a multiple of the component size, or a
    /// vertex attribute has an empty name.
    pub fn new(
        name: impl Into<String>,
        components: usize,
        component_type: ComponentType,
        normalized: bool,
        stride_bytes: usize,
        vertex_attribute: bool,
        vbo: VboState,
    ) -> Result<Self> {
        let name = name.into();
        if components == 0 || (vertex_attribute && components > 4) {
            return Err(Error::invalid_argument(format!(
                "{name}: components per element must be 1..=4, got {components}"
            )));
        }
        let bpc = component_type.bytes_per_component();
        let element_bytes = components * bpc;
        let stride_bytes = if stride_bytes == 0 {
            element_bytes
        } else {
            stride_bytes
        };
        if stride_bytes < element_bytes {
            return Err(Error::invalid_argument(format!(
                "{name}: stride {stride_bytes} is smaller than one element ({element_bytes} bytes)"
            )));
        }
        if stride_bytes % bpc != 0 {
            return Err(Error::invalid_argument(format!(
                "{name}: stride {stride_bytes} is not a multiple of {bpc} bytes per component"
            )));
        }
        if vertex_attribute && name.is_empty() {
            return Err(Error::invalid_argument(
                "a vertex attribute needs a non-empty name",
            ));
        }
        Ok(Self {
            name,
            location: -1,
            components,
            component_type,
            normalized,
            stride_bytes,
            vertex_attribute,
            vbo,
        })
    }

    /// GLSL attribute name (or a reserved name for index/interleaved parents).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute location, `-1` when unresolved.
    pub fn location(&self) -> i32 {
        self.location
    }

    /// Stamp a resolved location (or `-1` to invalidate).
    pub fn set_location(&mut self, location: i32) {
        self.location = location;
    }

    /// Components per element, `1..=4`.
    pub fn components(&self) -> usize {
        self.components
    }

    /// Element type.
    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    /// Bytes of one component.
    pub fn bytes_per_component(&self) -> usize {
        self.component_type.bytes_per_component()
    }

    /// Whether fixed-point values are normalized by the pipeline.
    pub fn normalized(&self) -> bool {
        self.normalized
    }

    /// Distance between consecutive elements in bytes.
    pub fn stride_bytes(&self) -> usize {
        self.stride_bytes
    }

    /// Distance between consecutive elements in components.
    pub fn stride_components(&self) -> usize {
        self.stride_bytes / self.bytes_per_component()
    }

    /// Whether this stream feeds a vertex attribute.
    pub fn is_vertex_attribute(&self) -> bool {
        self.vertex_attribute
    }

    /// VBO identity and placement.
    pub fn vbo(&self) -> &VboState {
        &self.vbo
    }

    /// Whether the stream is sourced from a VBO.
    pub fn uses_vbo(&self) -> bool {
        self.vbo.enabled
    }

    /// Set the VBO name once it has been generated.
    pub fn set_vbo_name(&mut self, name: u32) {
        self.vbo.name = name;
    }

    /// Move the stream inside its VBO.
    pub fn set_vbo_offset(&mut self, offset: usize) {
        self.vbo.offset = offset;
    }

    /// Switch VBO sourcing on or off.
    pub fn set_vbo_enabled(&mut self, enabled: bool) {
        self.vbo.enabled = enabled;
    }

    /// Forget the VBO: name and offset become `0` and VBO sourcing is off.
    pub fn clear_vbo(&mut self) {
        self.vbo.name = 0;
        self.vbo.offset = 0;
        self.vbo.enabled = false;
    }

    pub(crate) fn location_u32(&self) -> Option<u32> {
        u32::try_from(self.location).ok()
    }
}

impl fmt::Display for ArrayData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[loc {}, {}x{:?}{}, stride {}",
            self.name,
            self.location,
            self.components,
            self.component_type,
            if self.normalized { " norm" } else { "" },
            self.stride_bytes,
        )?;
        if self.vbo.enabled {
            write!(
                f,
                ", vbo {} @{} {:?}/{:?}",
                self.vbo.name, self.vbo.offset, self.vbo.target, self.vbo.usage
            )?;
        }
        f.write_str("]")
    }
}
