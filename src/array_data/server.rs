//! VBO-backed streams: buffer allocation, interleaved sub-arrays and mapped
//! GPU storage.

use std::ptr::NonNull;

use super::{
    ArrayData, GlArrayData, VboState, VboTarget, VboUsage, INDEX_ARRAY_NAME,
    INTERLEAVED_ARRAY_NAME,
};
use crate::data_type::ComponentType;
use crate::error::{Error, Result};
use crate::gpu::Gpu;
use crate::handler::AttributeHandler;

/// An active mapping of a stream's VBO into client memory.
#[derive(Debug)]
pub struct MappedStorage {
    ptr: NonNull<u8>,
    offset: usize,
    len: usize,
}

impl MappedStorage {
    /// Byte offset of the mapping inside the VBO.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct ServerStorage {
    /// Byte offset of the next interleaved sub-array.
    interleaved_offset: usize,
    mapped: Option<MappedStorage>,
}

impl GlArrayData {
    /// A VBO-backed GLSL attribute stream.
    ///
    /// # Errors
    ///
    /// *invalid-argument* for an invalid description.
    pub fn server(
        name: impl Into<String>,
        components: usize,
        component_type: ComponentType,
        normalized: bool,
        stride_bytes: usize,
        initial_elements: usize,
        usage: VboUsage,
    ) -> Result<Self> {
        let desc = ArrayData::new(
            name,
            components,
            component_type,
            normalized,
            stride_bytes,
            true,
            VboState::server(usage, VboTarget::Array),
        )?;
        Ok(Self::with_parts(
            desc,
            AttributeHandler::GlslSingle,
            initial_elements,
            0,
        ))
    }

    /// An index (element array) VBO.
    ///
    /// # Errors
    ///
    /// *invalid-argument* unless `component_type` is an unsigned byte, short
    /// or int type.
    pub fn server_index(
        components: usize,
        component_type: ComponentType,
        initial_elements: usize,
        usage: VboUsage,
    ) -> Result<Self> {
        if !matches!(
            component_type,
            ComponentType::UnsignedByte | ComponentType::UnsignedShort | ComponentType::UnsignedInt
        ) {
            return Err(Error::invalid_argument(format!(
                "index arrays must be unsigned integers, got {component_type:?}"
            )));
        }
        let desc = ArrayData::new(
            INDEX_ARRAY_NAME,
            components,
            component_type,
            false,
            0,
            false,
            VboState::server(usage, VboTarget::ElementArray),
        )?;
        Ok(Self::with_parts(
            desc,
            AttributeHandler::GenericData,
            initial_elements,
            0,
        ))
    }

    /// The parent of interleaved GLSL sub-arrays; `components` is the total
    /// per element (e.g. 6 for position + normal).
    ///
    /// # Errors
    ///
    /// *invalid-argument* for an invalid description.
    pub fn server_interleaved(
        components: usize,
        component_type: ComponentType,
        normalized: bool,
        initial_elements: usize,
        usage: VboUsage,
    ) -> Result<Self> {
        let desc = interleaved_desc(components, component_type, normalized, usage)?;
        Ok(Self::with_parts(
            desc,
            AttributeHandler::GlslInterleaved { subs: Vec::new() },
            initial_elements,
            0,
        ))
    }

    /// A VBO-backed GLSL attribute written through
    /// [`map_storage`](Self::map_storage) instead of a CPU buffer.
    ///
    /// # Errors
    ///
    /// *invalid-argument* for an invalid description or a zero element count.
    pub fn server_mapped(
        name: impl Into<String>,
        components: usize,
        component_type: ComponentType,
        normalized: bool,
        element_count: usize,
        usage: VboUsage,
    ) -> Result<Self> {
        let desc = ArrayData::new(
            name,
            components,
            component_type,
            normalized,
            0,
            true,
            VboState::server(usage, VboTarget::Array),
        )?;
        check_mapped_count(element_count)?;
        Ok(Self::with_parts(
            desc,
            AttributeHandler::GlslSingle,
            0,
            element_count,
        ))
    }

    /// Interleaved parent written through mapped storage.
    ///
    /// # Errors
    ///
    /// *invalid-argument* for an invalid description or a zero element count.
    pub fn server_interleaved_mapped(
        components: usize,
        component_type: ComponentType,
        normalized: bool,
        element_count: usize,
        usage: VboUsage,
    ) -> Result<Self> {
        let desc = interleaved_desc(components, component_type, normalized, usage)?;
        check_mapped_count(element_count)?;
        Ok(Self::with_parts(
            desc,
            AttributeHandler::GlslInterleaved { subs: Vec::new() },
            0,
            element_count,
        ))
    }

    /// Whether the stream lives in a VBO.
    pub fn uses_vbo(&self) -> bool {
        self.desc.uses_vbo()
    }

    /// VBO name, `0` before the first enable.
    pub fn vbo_name(&self) -> u32 {
        self.desc.vbo().name
    }

    /// Generate the VBO name if the stream is VBO-backed and has none yet,
    /// and hand it to interleaved sub-arrays.
    ///
    /// # Errors
    ///
    /// Buffer allocation failures.
    pub fn init_vbo(&mut self, gpu: &dyn Gpu) -> Result<()> {
        if !self.desc.uses_vbo() || self.desc.vbo().name != 0 {
            return Ok(());
        }
        let name = gpu.create_buffer()?;
        self.desc.set_vbo_name(name);
        if let Some(subs) = self.handler.sub_arrays_mut() {
            for sub in subs {
                sub.set_vbo_name(name);
            }
        }
        log::debug!("{}: allocated vbo {name}", self.desc.name());
        Ok(())
    }

    /// Add an interleaved sub-array of `components` components at the current
    /// interleaved offset.
    ///
    /// The sub-array shares the parent's VBO and stride; the running offset
    /// advances by `components * bytes_per_component`. The returned copy is
    /// a snapshot; [`sub_array`](Self::sub_array) returns the live one.
    ///
    /// # Errors
    ///
    /// *invalid-state* unless this is an interleaved parent,
    /// *invalid-argument* when the sub-array would not fit in one element.
    pub fn add_sub_array(
        &mut self,
        name: impl Into<String>,
        components: usize,
        target: VboTarget,
    ) -> Result<ArrayData> {
        let name = name.into();
        let bpc = self.desc.bytes_per_component();
        let offset = self.server.interleaved_offset;
        let end = offset + components * bpc;
        let limit = self.desc.components() * bpc;
        if end > limit {
            return Err(Error::invalid_argument(format!(
                "{name}: interleaved offset {end} exceeds the element size {limit}"
            )));
        }
        let vbo = VboState {
            name: self.desc.vbo().name,
            offset,
            usage: self.desc.vbo().usage,
            target,
            enabled: self.desc.uses_vbo(),
        };
        let sub = ArrayData::new(
            name,
            components,
            self.desc.component_type(),
            self.desc.normalized(),
            self.desc.stride_bytes(),
            true,
            vbo,
        )?;
        let Some(subs) = self.handler.sub_arrays_mut() else {
            return Err(Error::invalid_state(format!(
                "{}: sub-arrays need an interleaved parent",
                self.desc.name()
            )));
        };
        subs.push(sub.clone());
        self.server.interleaved_offset = end;
        Ok(sub)
    }

    /// Interleaved sub-array by name.
    pub fn sub_array(&self, name: &str) -> Option<&ArrayData> {
        self.handler.sub_arrays().iter().find(|s| s.name() == name)
    }

    /// Whether the VBO is currently mapped.
    pub fn is_mapped(&self) -> bool {
        self.server.mapped.is_some()
    }

    /// The active mapping record.
    pub fn mapped_storage(&self) -> Option<&MappedStorage> {
        self.server.mapped.as_ref()
    }

    /// Map the whole VBO for writing and return the mapped bytes.
    ///
    /// # Errors
    ///
    /// See [`map_storage_range`](Self::map_storage_range).
    pub fn map_storage(&mut self, gpu: &dyn Gpu, access: u32) -> Result<&mut [u8]> {
        let len = self.byte_capacity();
        self.map_storage_range(gpu, 0, len, access)
    }

    /// Orphan the VBO, then map `length` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// *invalid-state* when the stream has a CPU buffer, is not VBO-backed or
    /// is already mapped; *invalid-argument* when the range exceeds the
    /// storage; driver mapping failures are passed through.
    pub fn map_storage_range(
        &mut self,
        gpu: &dyn Gpu,
        offset: usize,
        length: usize,
        access: u32,
    ) -> Result<&mut [u8]> {
        if self.buffer.is_some() {
            return Err(Error::invalid_state(format!(
                "{}: cannot map storage of an array with a CPU buffer",
                self.desc.name()
            )));
        }
        if !self.desc.uses_vbo() {
            return Err(Error::invalid_state(format!("{}: not VBO backed", self.desc.name())));
        }
        if self.server.mapped.is_some() {
            return Err(Error::invalid_state(format!("{}: already mapped", self.desc.name())));
        }
        let capacity = self.byte_capacity();
        if offset + length > capacity {
            return Err(Error::invalid_argument(format!(
                "{}: map range {offset}+{length} exceeds {capacity} bytes",
                self.desc.name()
            )));
        }
        self.init_vbo(gpu)?;
        let vbo = *self.desc.vbo();
        let target = vbo.target.to_gl();
        gpu.bind_buffer(target, vbo.name);
        gpu.buffer_data_size(target, capacity, vbo.usage.to_gl());
        let mapped = gpu.map_buffer_range(target, offset, length, access);
        gpu.bind_buffer(target, 0);
        let ptr = mapped?;
        self.sealed = false;
        let storage = self.server.mapped.insert(MappedStorage {
            ptr,
            offset,
            len: length,
        });
        // SAFETY: the driver keeps `len` bytes at `ptr` valid and writable
        // until the buffer is unmapped, which only `unmap_storage` does and
        // which needs `&mut self`; the returned slice borrows `self`.
        Ok(unsafe { std::slice::from_raw_parts_mut(storage.ptr.as_ptr(), storage.len) })
    }

    /// The bytes of the active mapping.
    pub fn mapped_bytes_mut(&mut self) -> Option<&mut [u8]> {
        let storage = self.server.mapped.as_ref()?;
        // SAFETY: see `map_storage_range`; the mapping is live while it is
        // recorded in `self.server.mapped`.
        Some(unsafe { std::slice::from_raw_parts_mut(storage.ptr.as_ptr(), storage.len) })
    }

    /// Unmap the VBO and seal the stream.
    ///
    /// # Errors
    ///
    /// *invalid-state* when nothing is mapped, *gpu-runtime-error* when the
    /// driver reports that the store was lost while mapped.
    pub fn unmap_storage(&mut self, gpu: &dyn Gpu) -> Result<()> {
        if self.server.mapped.take().is_none() {
            return Err(Error::invalid_state(format!("{}: not mapped", self.desc.name())));
        }
        let vbo = *self.desc.vbo();
        let target = vbo.target.to_gl();
        gpu.bind_buffer(target, vbo.name);
        let intact = gpu.unmap_buffer(target);
        gpu.bind_buffer(target, 0);
        self.seal(true);
        self.written_to_vbo = true;
        if intact {
            Ok(())
        } else {
            Err(Error::Gpu(format!(
                "{}: buffer store was corrupted while mapped",
                self.desc.name()
            )))
        }
    }

    /// Re-upload the sealed CPU data into the existing VBO with
    /// `glBufferSubData`, without reallocating it.
    ///
    /// # Errors
    ///
    /// *invalid-state* unless the stream is sealed, has a CPU buffer and an
    /// allocated VBO.
    pub fn update_sub_data(&mut self, gpu: &dyn Gpu) -> Result<()> {
        let name = self.desc.vbo().name;
        let Some(buffer) = self.buffer.as_ref().filter(|_| self.sealed && name != 0) else {
            return Err(Error::invalid_state(format!(
                "{}: update needs a sealed CPU buffer and an allocated VBO",
                self.desc.name()
            )));
        };
        let vbo = self.desc.vbo();
        let target = vbo.target.to_gl();
        gpu.bind_buffer(target, name);
        gpu.buffer_sub_data(target, vbo.offset, buffer.bytes_until(buffer.limit()));
        gpu.bind_buffer(target, 0);
        self.written_to_vbo = true;
        Ok(())
    }

    /// Release the VBO (unmapping first if needed) and the CPU buffer.
    ///
    /// The stream is left cleared and detached from any shader state; the
    /// pipeline is not touched, disabling is the caller's job.
    pub fn destroy(&mut self, gpu: &dyn Gpu) {
        let vbo = *self.desc.vbo();
        if self.server.mapped.take().is_some() {
            gpu.bind_buffer(vbo.target.to_gl(), vbo.name);
            gpu.unmap_buffer(vbo.target.to_gl());
            gpu.bind_buffer(vbo.target.to_gl(), 0);
        }
        if vbo.name != 0 {
            gpu.delete_buffer(vbo.name);
            log::debug!("{}: deleted vbo {}", self.desc.name(), vbo.name);
        }
        self.buffer = None;
        self.mapped_element_count = 0;
        self.desc.clear_vbo();
        self.desc.set_location(-1);
        if let Some(subs) = self.handler.sub_arrays_mut() {
            for sub in subs {
                sub.clear_vbo();
            }
        }
        self.sealed = false;
        self.enabled = false;
        self.written_to_vbo = false;
        self.owner = None;
    }
}

fn interleaved_desc(
    components: usize,
    component_type: ComponentType,
    normalized: bool,
    usage: VboUsage,
) -> Result<ArrayData> {
    ArrayData::new(
        INTERLEAVED_ARRAY_NAME,
        components,
        component_type,
        normalized,
        0,
        false,
        VboState::server(usage, VboTarget::Array),
    )
}

fn check_mapped_count(element_count: usize) -> Result<()> {
    if element_count == 0 {
        return Err(Error::invalid_argument(
            "mapped arrays need a non-zero element count",
        ));
    }
    Ok(())
}
