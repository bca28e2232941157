//! CPU-resident attribute streams: typed puts, growth and the
//! seal/enable state machine.

use std::collections::HashMap;
use std::fmt;

use bytemuck::Pod;

use super::server::ServerStorage;
use super::{ArrayData, ComponentBuffer, VboState};
use crate::data_type::ComponentType;
use crate::error::{Error, Result};
use crate::gpu::{gl_i32, Gpu};
use crate::handler::{self, AttributeHandler, Stream};
use crate::shader::{ShaderState, StateToken};

/// The golden ratio, used as the default capacity growth factor.
pub const DEFAULT_GROWTH_FACTOR: f32 = 1.618_034;

/// A typed attribute stream with its backing storage.
///
/// Data is written with the `put*` family while unsealed, then the stream is
/// [sealed](Self::seal) and [enabled](Self::enable_buffer). Sealing flips the
/// CPU buffer into read mode; enabling uploads it (VBO streams, once per
/// seal) and points the attribute at it.
pub struct GlArrayData {
    pub(super) desc: ArrayData,
    pub(super) handler: AttributeHandler,
    pub(super) buffer: Option<ComponentBuffer>,
    pub(super) mapped_element_count: usize,
    pub(super) sealed: bool,
    pub(super) enabled: bool,
    pub(super) written_to_vbo: bool,
    pub(super) enable_always: bool,
    pub(super) growth_factor: f32,
    pub(super) owner: Option<StateToken>,
    pub(super) server: ServerStorage,
}

impl GlArrayData {
    pub(super) fn with_parts(
        desc: ArrayData,
        handler: AttributeHandler,
        initial_elements: usize,
        mapped_element_count: usize,
    ) -> Self {
        let buffer = (mapped_element_count == 0).then(|| {
            ComponentBuffer::new(
                initial_elements * desc.stride_components(),
                desc.bytes_per_component(),
            )
        });
        Self {
            desc,
            handler,
            buffer,
            mapped_element_count,
            sealed: false,
            enabled: false,
            written_to_vbo: mapped_element_count != 0,
            enable_always: false,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            owner: None,
            server: ServerStorage::default(),
        }
    }

    /// A client-memory GLSL attribute stream.
    ///
    /// # Errors
    ///
    /// *invalid-argument* for an invalid description (see [`ArrayData::new`]).
    pub fn client(
        name: impl Into<String>,
        components: usize,
        component_type: ComponentType,
        normalized: bool,
        stride_bytes: usize,
        initial_elements: usize,
    ) -> Result<Self> {
        let desc = ArrayData::new(
            name,
            components,
            component_type,
            normalized,
            stride_bytes,
            true,
            VboState::default(),
        )?;
        Ok(Self::with_parts(
            desc,
            AttributeHandler::GlslSingle,
            initial_elements,
            0,
        ))
    }

    /// The stream description.
    pub fn desc(&self) -> &ArrayData {
        &self.desc
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        self.desc.name()
    }

    /// Attribute location, `-1` when unresolved.
    pub fn location(&self) -> i32 {
        self.desc.location()
    }

    /// Stamp a location.
    pub fn set_location(&mut self, location: i32) {
        self.desc.set_location(location);
    }

    /// The handler feeding this stream to the pipeline.
    pub fn handler(&self) -> &AttributeHandler {
        &self.handler
    }

    /// CPU buffer, `None` for mapped streams.
    pub fn buffer(&self) -> Option<&ComponentBuffer> {
        self.buffer.as_ref()
    }

    /// Whether the stream is sealed (read mode).
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Whether the stream is currently enabled in the pipeline.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the VBO holds the current contents.
    pub fn is_written_to_vbo(&self) -> bool {
        self.written_to_vbo
    }

    /// Shader state managing this stream, if any.
    pub fn owner(&self) -> Option<StateToken> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<StateToken>) {
        self.owner = owner;
    }

    /// Capacity multiplier applied when a put runs out of room.
    pub fn growth_factor(&self) -> f32 {
        self.growth_factor
    }

    /// Change the growth factor.
    ///
    /// # Errors
    ///
    /// *invalid-argument* when `factor` is below `1.0` or not finite.
    pub fn set_growth_factor(&mut self, factor: f32) -> Result<()> {
        if !factor.is_finite() || factor < 1.0 {
            return Err(Error::invalid_argument(format!(
                "growth factor must be >= 1.0, got {factor}"
            )));
        }
        self.growth_factor = factor;
        Ok(())
    }

    /// Re-run the handler on every [`enable_buffer`](Self::enable_buffer),
    /// even when the enabled state does not change.
    pub fn set_enable_always(&mut self, always: bool) {
        self.enable_always = always;
    }

    /// Components written (sealed: the sealed extent).
    fn written_components(&self) -> usize {
        self.buffer
            .as_ref()
            .map_or(0, |b| if self.sealed { b.limit() } else { b.position() })
    }

    /// Number of complete elements written.
    pub fn element_count(&self) -> usize {
        match &self.buffer {
            Some(_) => self.byte_count() / self.desc.stride_bytes(),
            None => self.mapped_element_count,
        }
    }

    /// Element index of the write position.
    pub fn element_position(&self) -> usize {
        self.byte_position() / self.desc.stride_bytes()
    }

    /// Elements that fit before the limit.
    pub fn remaining_elements(&self) -> usize {
        self.remaining_bytes() / self.desc.stride_bytes()
    }

    /// Element capacity of the storage.
    pub fn element_capacity(&self) -> usize {
        match &self.buffer {
            Some(_) => self.byte_capacity() / self.desc.stride_bytes(),
            None => self.mapped_element_count,
        }
    }

    /// Bytes written (sealed: the sealed extent).
    pub fn byte_count(&self) -> usize {
        match &self.buffer {
            Some(_) => self.written_components() * self.desc.bytes_per_component(),
            None => self.mapped_element_count * self.desc.stride_bytes(),
        }
    }

    /// Byte offset of the write position.
    pub fn byte_position(&self) -> usize {
        self.buffer
            .as_ref()
            .map_or(0, |b| b.position() * b.bytes_per_component())
    }

    /// Bytes before the limit.
    pub fn remaining_bytes(&self) -> usize {
        self.buffer
            .as_ref()
            .map_or(0, |b| b.remaining() * b.bytes_per_component())
    }

    /// Byte capacity of the storage.
    pub fn byte_capacity(&self) -> usize {
        match &self.buffer {
            Some(b) => b.capacity() * b.bytes_per_component(),
            None => self.mapped_element_count * self.desc.stride_bytes(),
        }
    }

    /// One-line fill statistics for logging.
    pub fn fill_stats_string(&self) -> String {
        let capacity = self.byte_capacity();
        #[expect(clippy::cast_precision_loss)]
        let filled = if capacity == 0 {
            0.0
        } else {
            self.byte_count() as f64 / capacity as f64 * 100.0
        };
        format!(
            "elements[count {}, pos {}, remaining {}, capacity {}], \
             bytes[count {}, pos {}, remaining {}, capacity {}], filled {filled:.1}%",
            self.element_count(),
            self.element_position(),
            self.remaining_elements(),
            self.element_capacity(),
            self.byte_count(),
            self.byte_position(),
            self.remaining_bytes(),
            capacity,
        )
    }

    /// Flip between write mode (`false`) and read mode (`true`).
    ///
    /// Sealing marks the VBO stale so the next enable uploads again; mapped
    /// streams have no CPU data and stay marked as written.
    pub fn seal(&mut self, seal: bool) {
        if self.sealed == seal {
            return;
        }
        self.sealed = seal;
        self.written_to_vbo = self.buffer.is_none();
        if let Some(buffer) = &mut self.buffer {
            if seal {
                buffer.flip();
            } else {
                buffer.unflip();
            }
        }
        log::debug!("{} {}: {}", self.desc.name(), if seal { "sealed" } else { "unsealed" }, self.fill_stats_string());
    }

    /// [`seal`](Self::seal) followed by [`enable_buffer`](Self::enable_buffer)
    /// with the same flag.
    ///
    /// # Errors
    ///
    /// See [`enable_buffer`](Self::enable_buffer).
    pub fn seal_and_enable(
        &mut self,
        gpu: &dyn Gpu,
        state: Option<&mut ShaderState>,
        seal: bool,
    ) -> Result<()> {
        if seal {
            self.seal(true);
            self.enable_buffer(gpu, state, true)
        } else {
            self.enable_buffer(gpu, state, false)?;
            self.seal(false);
            Ok(())
        }
    }

    /// Back to write mode at position `0`, keeping the capacity.
    ///
    /// The enabled flag is dropped so that the next enable re-runs the
    /// handler (and re-uploads).
    pub fn clear(&mut self) {
        if let Some(buffer) = &mut self.buffer {
            buffer.clear();
        }
        self.sealed = false;
        self.enabled = false;
        self.written_to_vbo = self.buffer.is_none();
    }

    /// Disable the stream if enabled, then [`clear`](Self::clear).
    ///
    /// # Errors
    ///
    /// See [`enable_buffer`](Self::enable_buffer).
    pub fn reset(&mut self, gpu: &dyn Gpu, state: Option<&mut ShaderState>) -> Result<()> {
        if self.enabled {
            self.enable_buffer(gpu, state, false)?;
        }
        self.clear();
        Ok(())
    }

    /// Make room for `spare` more components, growing if needed.
    ///
    /// Returns whether the buffer grew. New capacity in elements is
    /// `max(required, ceil(capacity * growth_factor / stride))`.
    ///
    /// # Errors
    ///
    /// *invalid-state* when sealed or when the stream has no CPU buffer.
    pub fn grow_if_needed(&mut self, spare: usize) -> Result<bool> {
        if self.sealed {
            return Err(Error::invalid_state(format!(
                "{}: cannot grow a sealed array",
                self.desc.name()
            )));
        }
        let stride = self.desc.stride_components();
        let growth = f64::from(self.growth_factor);
        let name = self.desc.name();
        let Some(buffer) = &mut self.buffer else {
            return Err(Error::invalid_state(format!("{name}: no CPU buffer")));
        };
        if buffer.remaining() >= spare {
            return Ok(false);
        }
        let required_elements = (buffer.position() + spare).div_ceil(stride);
        #[expect(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let grown_elements = (buffer.capacity() as f64 * growth / stride as f64).ceil() as usize;
        let old_capacity = buffer.capacity();
        buffer.grow_to(required_elements.max(grown_elements) * stride);
        log::debug!(
            "{name}: grew from {old_capacity} to {} components",
            buffer.capacity()
        );
        Ok(true)
    }

    /// Append raw bytes, a whole number of components.
    ///
    /// # Errors
    ///
    /// *invalid-state* when sealed, *invalid-argument* when `bytes` is not a
    /// whole number of components.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.sealed {
            return Err(Error::invalid_state(format!(
                "{}: cannot write to a sealed array",
                self.desc.name()
            )));
        }
        let bpc = self.desc.bytes_per_component();
        if bytes.len() % bpc != 0 {
            return Err(Error::invalid_argument(format!(
                "{}: {} bytes is not a whole number of {bpc}-byte components",
                self.desc.name(),
                bytes.len()
            )));
        }
        self.grow_if_needed(bytes.len() / bpc)?;
        if let Some(buffer) = &mut self.buffer {
            buffer.put_bytes(bytes);
        }
        Ok(())
    }

    /// Append components of a `Pod` type matching the component size.
    ///
    /// # Errors
    ///
    /// As [`put_bytes`](Self::put_bytes), plus *invalid-argument* when
    /// `size_of::<T>()` differs from the component size.
    pub fn put<T: Pod>(&mut self, values: &[T]) -> Result<()> {
        self.check_component_size::<T>()?;
        self.put_bytes(bytemuck::cast_slice(values))
    }

    /// Append one component.
    ///
    /// # Errors
    ///
    /// See [`put`](Self::put).
    pub fn put1<T: Pod>(&mut self, x: T) -> Result<()> {
        self.put(&[x])
    }

    /// Append two components.
    ///
    /// # Errors
    ///
    /// See [`put`](Self::put).
    pub fn put2<T: Pod>(&mut self, x: T, y: T) -> Result<()> {
        self.put(&[x, y])
    }

    /// Append three components.
    ///
    /// # Errors
    ///
    /// See [`put`](Self::put).
    pub fn put3<T: Pod>(&mut self, x: T, y: T, z: T) -> Result<()> {
        self.put(&[x, y, z])
    }

    /// Append four components.
    ///
    /// # Errors
    ///
    /// See [`put`](Self::put).
    pub fn put4<T: Pod>(&mut self, x: T, y: T, z: T, w: T) -> Result<()> {
        self.put(&[x, y, z, w])
    }

    /// Zero-fill up to the next element boundary (the stride).
    ///
    /// # Errors
    ///
    /// See [`put_bytes`](Self::put_bytes).
    pub fn pad_element(&mut self) -> Result<()> {
        let stride = self.desc.stride_components();
        let position = self.buffer.as_ref().map_or(0, ComponentBuffer::position);
        let partial = position % stride;
        if partial == 0 {
            return Ok(());
        }
        let zeros = vec![0u8; (stride - partial) * self.desc.bytes_per_component()];
        self.put_bytes(&zeros)
    }

    /// Read back every written component as `T`.
    ///
    /// # Errors
    ///
    /// *invalid-argument* when `size_of::<T>()` differs from the component
    /// size, *invalid-state* for mapped streams.
    pub fn components<T: Pod>(&self) -> Result<Vec<T>> {
        self.check_component_size::<T>()?;
        let buffer = self.buffer.as_ref().ok_or_else(|| {
            Error::invalid_state(format!("{}: no CPU buffer", self.desc.name()))
        })?;
        Ok(buffer
            .bytes_until(self.written_components())
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    fn check_component_size<T>(&self) -> Result<()> {
        let size = std::mem::size_of::<T>();
        let bpc = self.desc.bytes_per_component();
        if size == bpc {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "{}: {size}-byte values do not match {bpc}-byte {:?} components",
                self.desc.name(),
                self.desc.component_type()
            )))
        }
    }

    fn stream(&mut self) -> (&mut AttributeHandler, Stream<'_>) {
        let written = self.written_components();
        let bytes = self.buffer.as_ref().map(|b| b.bytes_until(written));
        (
            &mut self.handler,
            Stream {
                desc: &mut self.desc,
                bytes,
                written_to_vbo: &mut self.written_to_vbo,
            },
        )
    }

    /// Enable or disable the stream in the pipeline.
    ///
    /// Enabling requires a sealed stream, allocates the VBO on first use and
    /// runs the handler's enable path: for VBO streams that binds, uploads
    /// if stale, points the attribute(s) and unbinds. With a shader state the
    /// location is resolved through it; without one the stream's own
    /// location is used.
    ///
    /// Nothing happens when the enabled state would not change, unless
    /// [`set_enable_always`](Self::set_enable_always) is on.
    ///
    /// # Errors
    ///
    /// *invalid-state* when enabling an unsealed stream, when the stream is
    /// managed by a different shader state, or when a location cannot be
    /// resolved; VBO allocation failures are passed through.
    pub fn enable_buffer(
        &mut self,
        gpu: &dyn Gpu,
        state: Option<&mut ShaderState>,
        enable: bool,
    ) -> Result<()> {
        if !self.enable_always && self.enabled == enable {
            return Ok(());
        }
        if enable {
            if !self.sealed {
                return Err(Error::invalid_state(format!(
                    "{}: seal the array before enabling it",
                    self.desc.name()
                )));
            }
            if let (Some(owner), Some(st)) = (self.owner, state.as_deref()) {
                if owner != st.token() {
                    return Err(Error::invalid_state(format!(
                        "{}: managed by another shader state",
                        self.desc.name()
                    )));
                }
            }
            self.init_vbo(gpu)?;
        }
        let (handler, stream) = self.stream();
        handler.enable_state(gpu, state, stream, enable)?;
        self.enabled = enable;
        Ok(())
    }

    /// The attribute descriptions this stream feeds: itself, its
    /// sub-arrays, or nothing for plain data streams.
    pub(crate) fn attributes(&self) -> Vec<&ArrayData> {
        match &self.handler {
            AttributeHandler::GenericData => Vec::new(),
            AttributeHandler::GlslSingle => vec![&self.desc],
            AttributeHandler::GlslInterleaved { subs } => subs.iter().collect(),
        }
    }

    /// Stamp the locations a shader state settled on after a program switch.
    ///
    /// An enabled client-memory stream is pointed at its sealed bytes again;
    /// VBO streams are re-pointed by the state itself.
    pub(crate) fn relocate(&mut self, gpu: &dyn Gpu, locations: &HashMap<String, i32>) -> Result<()> {
        let location_of = |name: &str| locations.get(name).copied().unwrap_or(-1);
        match &mut self.handler {
            AttributeHandler::GenericData => return Ok(()),
            AttributeHandler::GlslSingle => self.desc.set_location(location_of(self.desc.name())),
            AttributeHandler::GlslInterleaved { subs } => {
                for sub in subs {
                    sub.set_location(location_of(sub.name()));
                }
            }
        }
        if !self.enabled || self.desc.uses_vbo() {
            return Ok(());
        }
        let written = self.written_components();
        if let (Some(loc), Some(buffer)) = (self.desc.location_u32(), &self.buffer) {
            handler::attrib_client_pointer(gpu, loc, &self.desc, buffer.bytes_until(written))?;
        }
        Ok(())
    }

    /// Bind (`true`) or unbind the VBO, uploading stale CPU data on bind.
    ///
    /// Returns `true` iff the stream uses a VBO.
    ///
    /// # Errors
    ///
    /// *invalid-state* when binding an unsealed stream; VBO allocation
    /// failures are passed through.
    pub fn bind_buffer(&mut self, gpu: &dyn Gpu, bind: bool) -> Result<bool> {
        if bind {
            if !self.sealed && self.desc.uses_vbo() {
                return Err(Error::invalid_state(format!(
                    "{}: seal the array before binding it",
                    self.desc.name()
                )));
            }
            self.init_vbo(gpu)?;
        }
        let (_, mut stream) = self.stream();
        Ok(handler::bind_stream(gpu, &mut stream, bind))
    }

    /// `glDrawArrays` over every written element.
    ///
    /// # Errors
    ///
    /// *invalid-state* when unsealed.
    pub fn draw_arrays(&self, gpu: &dyn Gpu, mode: u32) -> Result<()> {
        if !self.sealed {
            return Err(Error::invalid_state(format!(
                "{}: seal the array before drawing",
                self.desc.name()
            )));
        }
        gpu.draw_arrays(mode, 0, gl_i32(self.element_count())?);
        Ok(())
    }

    /// `glDrawElements` with this stream as the bound index buffer.
    ///
    /// The stream must be an enabled element-array VBO.
    ///
    /// # Errors
    ///
    /// *invalid-state* when the stream is not an enabled index VBO.
    pub fn draw_elements(&self, gpu: &dyn Gpu, mode: u32) -> Result<()> {
        let vbo = self.desc.vbo();
        if !vbo.enabled || vbo.target != super::VboTarget::ElementArray || !self.enabled {
            return Err(Error::invalid_state(format!(
                "{}: draw_elements needs an enabled index VBO",
                self.desc.name()
            )));
        }
        let count = self.element_count() * self.desc.components();
        gpu.draw_elements(
            mode,
            gl_i32(count)?,
            self.desc.component_type().to_gl(),
            vbo.offset,
        );
        Ok(())
    }
}

impl fmt::Debug for GlArrayData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlArrayData")
            .field("desc", &self.desc)
            .field("handler", &self.handler)
            .field("sealed", &self.sealed)
            .field("enabled", &self.enabled)
            .field("written_to_vbo", &self.written_to_vbo)
            .field("stats", &self.fill_stats_string())
            .finish_non_exhaustive()
    }
}
