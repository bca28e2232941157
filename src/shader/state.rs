//! The shader state: the current program plus everything that has to be
//! re-established on it when programs are switched.
//!
//! Attribute locations are cached by name. Every attribute stream the state
//! has pointed is remembered as an [`ArrayData`] snapshot, so that after a
//! program switch its location can be re-queried on the new program and the
//! pointer, enable flag and VBO binding re-issued without re-uploading.
//! Managed streams are reached through their shared handles: snapshots are
//! refreshed from them and client-memory ones are pointed at their data
//! again. Uniforms are remembered the same way and re-sent.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{SharedArray, SharedProgram, SharedUniform};
use crate::array_data::ArrayData;
use crate::error::{Error, Result};
use crate::gpu::Gpu;
use crate::handler;
use crate::shader::GlUniformData;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies a [`ShaderState`] to the attribute streams it manages.
///
/// A managed stream refuses to be enabled through any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateToken(u64);

/// Current program, attribute and uniform bookkeeping for one context.
pub struct ShaderState {
    token: StateToken,
    verbose: bool,
    program: Option<SharedProgram>,
    /// Set by a program switch, cleared by the next `use_program(true)`.
    reset_required: bool,
    enabled_attribs: HashMap<String, bool>,
    active_attrib_locations: HashMap<String, i32>,
    active_attribs: HashMap<String, ArrayData>,
    managed_attribs: Vec<SharedArray>,
    active_uniforms: HashMap<String, SharedUniform>,
    managed_uniforms: Vec<SharedUniform>,
    attachments: HashMap<String, Box<dyn Any>>,
}

impl Default for ShaderState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderState {
    /// An empty state without a program.
    pub fn new() -> Self {
        Self {
            token: StateToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)),
            verbose: false,
            program: None,
            reset_required: false,
            enabled_attribs: HashMap::new(),
            active_attrib_locations: HashMap::new(),
            active_attribs: HashMap::new(),
            managed_attribs: Vec::new(),
            active_uniforms: HashMap::new(),
            managed_uniforms: Vec::new(),
            attachments: HashMap::new(),
        }
    }

    /// This state's identity.
    pub fn token(&self) -> StateToken {
        self.token
    }

    /// Log location resolution at info level and unresolvable names as
    /// warnings.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// See [`set_verbose`](Self::set_verbose).
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// The attached program.
    pub fn shader_program(&self) -> Option<&SharedProgram> {
        self.program.as_ref()
    }

    /// Whether the attached program is bound.
    pub fn in_use(&self) -> bool {
        self.program.as_ref().is_some_and(|p| p.borrow().in_use())
    }

    /// Whether the attached program is linked.
    pub fn linked(&self) -> bool {
        self.program.as_ref().is_some_and(|p| p.borrow().is_linked())
    }

    /// Make `program` the current program.
    ///
    /// Switching away from another program marks the state for a reset: the
    /// new program is bound (linking it if needed), every known attribute is
    /// re-resolved and re-pointed on it, every known uniform re-sent. With
    /// `enable == false` it is unbound again afterwards. Returns whether the
    /// program changed.
    ///
    /// # Errors
    ///
    /// Link, compile and resolution failures of the new program.
    pub fn attach_shader_program(
        &mut self,
        gpu: &dyn Gpu,
        program: SharedProgram,
        enable: bool,
    ) -> Result<bool> {
        if self.program.as_ref().is_some_and(|cur| Rc::ptr_eq(cur, &program)) {
            if enable {
                self.use_program(gpu, true)?;
            }
            return Ok(false);
        }
        if let Some(previous) = self.program.take() {
            let mut previous = previous.borrow_mut();
            if previous.in_use() {
                if enable {
                    previous.notify_not_in_use();
                } else {
                    previous.use_program(gpu, false)?;
                }
            }
            log::debug!("switching from program {}", previous.id());
            self.reset_required = true;
        }
        log::debug!("attached {}", program.borrow());
        self.program = Some(program);

        if self.reset_required || enable {
            self.use_program(gpu, true)?;
            if !enable {
                self.use_program(gpu, false)?;
            }
        }
        Ok(true)
    }

    /// Bind or unbind the current program.
    ///
    /// Binding links the program first if needed, re-binding the known
    /// attribute locations before the link. After a program switch the
    /// attributes and uniforms are reset on the new program.
    ///
    /// # Errors
    ///
    /// *invalid-state* when binding without a program; link and compile
    /// failures.
    pub fn use_program(&mut self, gpu: &dyn Gpu, on: bool) -> Result<()> {
        let Some(program) = self.program.clone() else {
            if on {
                return Err(Error::invalid_state("no shader program attached"));
            }
            return Ok(());
        };
        if !on {
            return program.borrow_mut().use_program(gpu, false);
        }
        if program.borrow().is_linked() {
            program.borrow_mut().use_program(gpu, true)?;
            if self.reset_required {
                self.reset_all_attributes(gpu)?;
                self.reset_all_uniforms(gpu)?;
            }
        } else {
            self.set_all_attributes(gpu)?;
            program.borrow_mut().link(gpu)?;
            program.borrow_mut().use_program(gpu, true)?;
            if self.reset_required {
                self.reset_all_uniforms(gpu)?;
            }
        }
        self.reset_required = false;
        Ok(())
    }

    fn program_name(&self) -> Option<u32> {
        self.program.as_ref().map(|p| p.borrow().program_name())
    }

    fn linked_program_name(&self) -> Result<u32> {
        match &self.program {
            Some(p) if p.borrow().is_linked() => Ok(p.borrow().program_name()),
            Some(p) => Err(Error::invalid_state(format!(
                "program {} is not linked",
                p.borrow().id()
            ))),
            None => Err(Error::invalid_state("no shader program attached")),
        }
    }

    fn in_use_program_name(&self) -> Result<u32> {
        match &self.program {
            Some(p) if p.borrow().in_use() => Ok(p.borrow().program_name()),
            _ => Err(Error::invalid_state("no shader program in use")),
        }
    }

    // Attributes

    /// Manage (`true`) or release an attribute stream.
    ///
    /// A managed stream gets its cached location stamped on, follows the
    /// program on switches, is destroyed by
    /// [`destroy`](Self::destroy), and can only be enabled through this state.
    pub fn manage_array(&mut self, array: &SharedArray, manage: bool) {
        let mut data = array.borrow_mut();
        if manage {
            if let Some(&loc) = self.active_attrib_locations.get(data.name()) {
                data.set_location(loc);
            }
            data.set_owner(Some(self.token));
            if !self.managed_attribs.iter().any(|a| Rc::ptr_eq(a, array)) {
                self.managed_attribs.push(Rc::clone(array));
            }
        } else {
            data.set_owner(None);
            self.managed_attribs.retain(|a| !Rc::ptr_eq(a, array));
        }
    }

    /// Managed attribute streams.
    pub fn managed_arrays(&self) -> &[SharedArray] {
        &self.managed_attribs
    }

    /// The managed stream called `name`.
    pub fn array(&self, name: &str) -> Option<SharedArray> {
        self.managed_attribs
            .iter()
            .find(|a| a.borrow().name() == name)
            .cloned()
    }

    /// Bind `name` to `location` before the next link.
    ///
    /// # Errors
    ///
    /// *invalid-state* without a program or when it is already linked;
    /// *invalid-argument* for a negative location.
    pub fn bind_attrib_location(&mut self, gpu: &dyn Gpu, location: i32, name: &str) -> Result<()> {
        let program = match &self.program {
            Some(p) if p.borrow().is_linked() => {
                return Err(Error::invalid_state(format!(
                    "{name}: cannot bind a location after link"
                )))
            }
            Some(p) => p.borrow_mut().init(gpu)?,
            None => return Err(Error::invalid_state("no shader program attached")),
        };
        let loc = u32::try_from(location)
            .map_err(|_| Error::invalid_argument(format!("{name}: bad location {location}")))?;
        self.active_attrib_locations.insert(name.to_string(), location);
        gpu.bind_attrib_location(program, loc, name);
        if self.verbose {
            log::info!("bound attribute {name} to {location}");
        }
        Ok(())
    }

    /// [`bind_attrib_location`](Self::bind_attrib_location) for a stream,
    /// which is stamped with the location and remembered.
    ///
    /// # Errors
    ///
    /// See [`bind_attrib_location`](Self::bind_attrib_location).
    pub fn bind_attrib_location_data(
        &mut self,
        gpu: &dyn Gpu,
        location: i32,
        data: &mut ArrayData,
    ) -> Result<()> {
        self.bind_attrib_location(gpu, location, data.name())?;
        data.set_location(location);
        self.active_attribs.insert(data.name().to_string(), data.clone());
        Ok(())
    }

    /// The location of attribute `name`: cached, or queried from the linked
    /// program and cached. `-1` if the program has no such attribute.
    ///
    /// # Errors
    ///
    /// *invalid-state* when the name is not cached and the program is
    /// missing or not linked.
    pub fn get_attrib_location(&mut self, gpu: &dyn Gpu, name: &str) -> Result<i32> {
        if let Some(&loc) = self.active_attrib_locations.get(name) {
            return Ok(loc);
        }
        let program = self.linked_program_name()?;
        Ok(self.query_attrib_location(gpu, program, name))
    }

    /// [`get_attrib_location`](Self::get_attrib_location) for a stream, which
    /// is stamped with the result and remembered.
    ///
    /// # Errors
    ///
    /// See [`get_attrib_location`](Self::get_attrib_location).
    pub fn get_attrib_location_data(&mut self, gpu: &dyn Gpu, data: &mut ArrayData) -> Result<i32> {
        let loc = self.get_attrib_location(gpu, data.name())?;
        self.remember(data, loc);
        Ok(loc)
    }

    fn query_attrib_location(&mut self, gpu: &dyn Gpu, program: u32, name: &str) -> i32 {
        let loc = gpu.attrib_location(program, name);
        if loc >= 0 {
            self.active_attrib_locations.insert(name.to_string(), loc);
            if self.verbose {
                log::info!("attribute {name} resolved to {loc}");
            }
        } else if self.verbose {
            log::warn!("attribute {name} not found in program");
        }
        loc
    }

    /// Like `get_attrib_location_data`, but an unlinked program yields `-1`.
    fn resolve(&mut self, gpu: &dyn Gpu, data: &mut ArrayData) -> Result<i32> {
        let loc = if let Some(&loc) = self.active_attrib_locations.get(data.name()) {
            loc
        } else {
            let program = match &self.program {
                Some(p) => {
                    let p = p.borrow();
                    p.is_linked().then(|| p.program_name())
                }
                None => {
                    return Err(Error::invalid_state(format!(
                        "{}: no shader program attached",
                        data.name()
                    )))
                }
            };
            match program {
                Some(program) => self.query_attrib_location(gpu, program, data.name()),
                None => -1,
            }
        };
        self.remember(data, loc);
        Ok(loc)
    }

    fn remember(&mut self, data: &mut ArrayData, loc: i32) {
        data.set_location(loc);
        self.active_attribs.insert(data.name().to_string(), data.clone());
    }

    /// Enable attribute `name`. Returns whether the GPU was touched; an
    /// unresolvable name is still recorded as enabled.
    ///
    /// # Errors
    ///
    /// See [`get_attrib_location`](Self::get_attrib_location).
    pub fn enable_vertex_attrib_array(&mut self, gpu: &dyn Gpu, name: &str) -> Result<bool> {
        self.enabled_attribs.insert(name.to_string(), true);
        let loc = self.get_attrib_location(gpu, name)?;
        Ok(self.toggle(gpu, name, loc, true))
    }

    /// Disable attribute `name`. Returns whether the GPU was touched.
    ///
    /// # Errors
    ///
    /// See [`get_attrib_location`](Self::get_attrib_location).
    pub fn disable_vertex_attrib_array(&mut self, gpu: &dyn Gpu, name: &str) -> Result<bool> {
        self.enabled_attribs.insert(name.to_string(), false);
        let loc = self.get_attrib_location(gpu, name)?;
        Ok(self.toggle(gpu, name, loc, false))
    }

    /// Enable the stream described by `data`, resolving and stamping its
    /// location. Returns whether the GPU was touched.
    ///
    /// # Errors
    ///
    /// *invalid-state* when no program is attached.
    pub fn enable_vertex_attrib_array_data(
        &mut self,
        gpu: &dyn Gpu,
        data: &mut ArrayData,
    ) -> Result<bool> {
        self.enabled_attribs.insert(data.name().to_string(), true);
        let loc = self.resolve(gpu, data)?;
        Ok(self.toggle(gpu, data.name(), loc, true))
    }

    /// Disable the stream described by `data`. Returns whether the GPU was
    /// touched.
    ///
    /// # Errors
    ///
    /// *invalid-state* when no program is attached.
    pub fn disable_vertex_attrib_array_data(
        &mut self,
        gpu: &dyn Gpu,
        data: &mut ArrayData,
    ) -> Result<bool> {
        self.enabled_attribs.insert(data.name().to_string(), false);
        let loc = self.resolve(gpu, data)?;
        Ok(self.toggle(gpu, data.name(), loc, false))
    }

    fn toggle(&self, gpu: &dyn Gpu, name: &str, loc: i32, enable: bool) -> bool {
        let Ok(loc) = u32::try_from(loc) else {
            if self.verbose {
                log::warn!("attribute {name} has no location, recorded as enabled={enable}");
            }
            return false;
        };
        if enable {
            gpu.enable_vertex_attrib_array(loc);
        } else {
            gpu.disable_vertex_attrib_array(loc);
        }
        true
    }

    /// Point the attribute at `data`'s VBO (which must be bound). Returns
    /// whether the GPU was touched.
    ///
    /// # Errors
    ///
    /// *invalid-state* when no program is attached; *invalid-argument* for
    /// sizes GL cannot express.
    pub fn vertex_attrib_pointer(&mut self, gpu: &dyn Gpu, data: &mut ArrayData) -> Result<bool> {
        let Ok(loc) = u32::try_from(self.resolve(gpu, data)?) else {
            return Ok(false);
        };
        handler::attrib_pointer(gpu, loc, data)?;
        Ok(true)
    }

    /// Point the attribute at client memory. Returns whether the GPU was
    /// touched.
    ///
    /// # Errors
    ///
    /// *invalid-state* when no program is attached; *invalid-argument* for
    /// sizes GL cannot express.
    pub fn vertex_attrib_client_pointer(
        &mut self,
        gpu: &dyn Gpu,
        data: &mut ArrayData,
        bytes: &[u8],
    ) -> Result<bool> {
        let Ok(loc) = u32::try_from(self.resolve(gpu, data)?) else {
            return Ok(false);
        };
        handler::attrib_client_pointer(gpu, loc, data, bytes)?;
        Ok(true)
    }

    /// Re-resolve every known attribute on the (linked) current program and
    /// re-issue enable flags and VBO pointers.
    ///
    /// Managed streams are stamped with their new locations, and enabled
    /// client-memory ones are pointed at their data again. Client-memory
    /// streams the state does not manage have to be re-enabled by the caller.
    ///
    /// # Errors
    ///
    /// *invalid-state* when the program is missing or not linked.
    pub fn reset_all_attributes(&mut self, gpu: &dyn Gpu) -> Result<()> {
        let program = self.linked_program_name()?;
        self.relocate_all(gpu, program, false)
    }

    /// The pre-link counterpart of
    /// [`reset_all_attributes`](Self::reset_all_attributes): every remembered
    /// stream with a location has it bound by name on the current program.
    fn set_all_attributes(&mut self, gpu: &dyn Gpu) -> Result<()> {
        let program = match &self.program {
            Some(p) => p.borrow_mut().init(gpu)?,
            None => return Err(Error::invalid_state("no shader program attached")),
        };
        self.relocate_all(gpu, program, true)
    }

    fn relocate_all(&mut self, gpu: &dyn Gpu, program: u32, pre_link: bool) -> Result<()> {
        self.active_attrib_locations.clear();
        self.refresh_snapshots();
        let mut attribs = std::mem::take(&mut self.active_attribs);
        let result = attribs
            .values_mut()
            .try_for_each(|desc| self.relocate(gpu, program, desc, pre_link));
        self.active_attribs = attribs;
        result?;
        for array in &self.managed_attribs {
            // a stream borrowed by the caller picks its location up on its next enable
            if let Ok(mut array) = array.try_borrow_mut() {
                array.relocate(gpu, &self.active_attrib_locations)?;
            }
        }
        Ok(())
    }

    /// Take VBO identity and layout of the remembered attributes from the
    /// managed streams, which may have been reallocated or destroyed since.
    fn refresh_snapshots(&mut self) {
        for array in &self.managed_attribs {
            let Ok(array) = array.try_borrow() else {
                continue;
            };
            for desc in array.attributes() {
                if let Some(snapshot) = self.active_attribs.get_mut(desc.name()) {
                    let loc = snapshot.location();
                    *snapshot = desc.clone();
                    snapshot.set_location(loc);
                }
            }
        }
    }

    fn relocate(
        &mut self,
        gpu: &dyn Gpu,
        program: u32,
        desc: &mut ArrayData,
        pre_link: bool,
    ) -> Result<()> {
        let loc = if pre_link {
            let Ok(loc) = u32::try_from(desc.location()) else {
                return Ok(());
            };
            gpu.bind_attrib_location(program, loc, desc.name());
            desc.location()
        } else {
            gpu.attrib_location(program, desc.name())
        };
        desc.set_location(loc);
        let Ok(loc_u) = u32::try_from(loc) else {
            if self.verbose {
                log::warn!("attribute {} not found after program switch", desc.name());
            }
            return Ok(());
        };
        self.active_attrib_locations.insert(desc.name().to_string(), loc);
        if self.enabled_attribs.get(desc.name()) == Some(&true) {
            gpu.enable_vertex_attrib_array(loc_u);
        }
        let vbo = *desc.vbo();
        if vbo.enabled && vbo.name != 0 {
            gpu.bind_buffer(vbo.target.to_gl(), vbo.name);
            let result = handler::attrib_pointer(gpu, loc_u, desc);
            gpu.bind_buffer(vbo.target.to_gl(), 0);
            result?;
        }
        if self.verbose {
            log::info!("attribute {} relocated to {loc}", desc.name());
        }
        Ok(())
    }

    /// Disable every enabled attribute and forget all attribute bookkeeping.
    /// Managed streams are released, not destroyed.
    pub fn release_all_attributes(&mut self, gpu: &dyn Gpu) {
        for (name, &loc) in &self.active_attrib_locations {
            if self.enabled_attribs.get(name) == Some(&true) {
                if let Ok(loc) = u32::try_from(loc) {
                    gpu.disable_vertex_attrib_array(loc);
                }
            }
        }
        for array in self.managed_attribs.drain(..) {
            array.borrow_mut().set_owner(None);
        }
        self.enabled_attribs.clear();
        self.active_attrib_locations.clear();
        self.active_attribs.clear();
    }

    /// The remembered snapshot of attribute `name`.
    pub fn attribute(&self, name: &str) -> Option<&ArrayData> {
        self.active_attribs.get(name)
    }

    /// Whether attribute `name` was last enabled (rather than disabled).
    pub fn is_attribute_enabled(&self, name: &str) -> bool {
        self.enabled_attribs.get(name) == Some(&true)
    }

    // Uniforms

    /// Manage (`true`) or release a uniform. Managed uniforms are re-resolved
    /// and re-sent after program switches.
    pub fn manage_uniform(&mut self, uniform: &SharedUniform, manage: bool) {
        let name = uniform.borrow().name().to_string();
        if manage {
            if !self.managed_uniforms.iter().any(|u| Rc::ptr_eq(u, uniform)) {
                self.managed_uniforms.push(Rc::clone(uniform));
            }
            self.active_uniforms.insert(name, Rc::clone(uniform));
        } else {
            self.managed_uniforms.retain(|u| !Rc::ptr_eq(u, uniform));
            if self
                .active_uniforms
                .get(&name)
                .is_some_and(|u| Rc::ptr_eq(u, uniform))
            {
                self.active_uniforms.remove(&name);
            }
        }
    }

    /// The active uniform called `name`.
    pub fn uniform(&self, name: &str) -> Option<SharedUniform> {
        self.active_uniforms.get(name).cloned()
    }

    /// Resolve the uniform's location on the program in use, remembering it
    /// on success. Returns whether it has a location.
    ///
    /// # Errors
    ///
    /// *invalid-state* when it has no location and no program is in use.
    pub fn resolve_uniform(&mut self, gpu: &dyn Gpu, uniform: &SharedUniform) -> Result<bool> {
        if uniform.borrow().has_location() {
            return Ok(true);
        }
        let program = self.in_use_program_name()?;
        let resolved = self.resolve_uniform_data(gpu, program, &mut uniform.borrow_mut());
        if resolved {
            let name = uniform.borrow().name().to_string();
            self.active_uniforms.insert(name, Rc::clone(uniform));
        }
        Ok(resolved)
    }

    fn resolve_uniform_data(&self, gpu: &dyn Gpu, program: u32, uniform: &mut GlUniformData) -> bool {
        let loc = if uniform.is_buffer() {
            gpu.uniform_block_index(program, uniform.name())
                .and_then(|index| i32::try_from(index).ok())
                .unwrap_or(-1)
        } else {
            gpu.uniform_location(program, uniform.name())
        };
        uniform.set_location(loc);
        if loc < 0 {
            if self.verbose {
                log::warn!("uniform {} not found in program", uniform.name());
            }
            return false;
        }
        if self.verbose {
            log::info!("uniform {} resolved to {loc}", uniform.name());
        }
        true
    }

    /// Resolve if needed and send the uniform. An unresolvable uniform is
    /// dropped from the active set. Returns whether it was sent.
    ///
    /// # Errors
    ///
    /// *invalid-state* when no program is in use; send failures.
    pub fn push_uniform(&mut self, gpu: &dyn Gpu, uniform: &SharedUniform) -> Result<bool> {
        let program = self.in_use_program_name()?;
        if !self.resolve_uniform(gpu, uniform)? {
            let name = uniform.borrow().name().to_string();
            if self
                .active_uniforms
                .get(&name)
                .is_some_and(|u| Rc::ptr_eq(u, uniform))
            {
                self.active_uniforms.remove(&name);
                log::warn!("uniform {name} dropped, not present in program");
            }
            return Ok(false);
        }
        uniform.borrow_mut().send(gpu, program)?;
        Ok(true)
    }

    /// Resolve (if needed) and send every active uniform.
    ///
    /// # Errors
    ///
    /// *invalid-state* when no program is in use; send failures.
    pub fn push_all_uniforms(&mut self, gpu: &dyn Gpu) -> Result<()> {
        let program = self.in_use_program_name()?;
        for uniform in self.active_uniforms.values() {
            let mut uniform = uniform.borrow_mut();
            if uniform.has_location() || self.resolve_uniform_data(gpu, program, &mut uniform) {
                uniform.send(gpu, program)?;
            }
        }
        Ok(())
    }

    /// Re-resolve every active and managed uniform on the program in use
    /// after a switch and send the plain ones. Blocks are bound when pushed.
    ///
    /// Uniforms the program does not declare are dropped from the active set;
    /// managed ones come back once a later program declares them.
    ///
    /// # Errors
    ///
    /// *invalid-state* when no program is in use; send failures.
    pub fn reset_all_uniforms(&mut self, gpu: &dyn Gpu) -> Result<()> {
        let program = self.in_use_program_name()?;
        let mut uniforms: Vec<SharedUniform> = self.active_uniforms.drain().map(|(_, u)| u).collect();
        for managed in &self.managed_uniforms {
            if !uniforms.iter().any(|u| Rc::ptr_eq(u, managed)) {
                uniforms.push(Rc::clone(managed));
            }
        }
        for uniform in uniforms {
            let name = {
                let mut data = uniform.borrow_mut();
                data.set_location(-1);
                if !self.resolve_uniform_data(gpu, program, &mut data) {
                    log::warn!("uniform {} dropped, not present in program", data.name());
                    continue;
                }
                if !data.is_buffer() {
                    data.send(gpu, program)?;
                }
                data.name().to_string()
            };
            self.active_uniforms.insert(name, uniform);
        }
        Ok(())
    }

    /// Forget every uniform.
    pub fn release_all_uniforms(&mut self) {
        self.active_uniforms.clear();
        self.managed_uniforms.clear();
    }

    // Teardown

    /// Unbind the program, optionally destroy the managed streams and the
    /// program (and its owned codes), and forget all bookkeeping.
    ///
    /// # Errors
    ///
    /// Failures unbinding the program.
    pub fn release(
        &mut self,
        gpu: &dyn Gpu,
        destroy_attribs: bool,
        destroy_program: bool,
        destroy_code: bool,
    ) -> Result<()> {
        if self.linked() {
            self.use_program(gpu, false)?;
        }
        if destroy_attribs {
            for array in &self.managed_attribs {
                array.borrow_mut().destroy(gpu);
            }
        }
        self.release_all_attributes(gpu);
        self.release_all_uniforms();
        if destroy_program {
            if let Some(program) = self.program.take() {
                program.borrow_mut().release(gpu, destroy_code);
            }
        }
        log::debug!("released {self}");
        Ok(())
    }

    /// `release(false, true, true)`.
    ///
    /// # Errors
    ///
    /// See [`release`](Self::release).
    pub fn destroy_shader_program(&mut self, gpu: &dyn Gpu) -> Result<()> {
        self.release(gpu, false, true, true)
    }

    /// `release(true, false, false)`.
    ///
    /// # Errors
    ///
    /// See [`release`](Self::release).
    pub fn destroy_all_data(&mut self, gpu: &dyn Gpu) -> Result<()> {
        self.release(gpu, true, false, false)
    }

    /// `release(false, false, false)`.
    ///
    /// # Errors
    ///
    /// See [`release`](Self::release).
    pub fn release_all_data(&mut self, gpu: &dyn Gpu) -> Result<()> {
        self.release(gpu, false, false, false)
    }

    /// `release(true, true, true)` and drop every attached object.
    ///
    /// # Errors
    ///
    /// See [`release`](Self::release).
    pub fn destroy(&mut self, gpu: &dyn Gpu) -> Result<()> {
        self.release(gpu, true, true, true)?;
        self.attachments.clear();
        Ok(())
    }

    // Attachments

    /// Attach an arbitrary object under `name`, returning the previous one.
    pub fn attach_object<T: Any>(
        &mut self,
        name: impl Into<String>,
        object: T,
    ) -> Option<Box<dyn Any>> {
        self.attachments.insert(name.into(), Box::new(object))
    }

    /// The object attached under `name`, if it is a `T`.
    pub fn attached_object<T: Any>(&self, name: &str) -> Option<&T> {
        self.attachments.get(name)?.downcast_ref()
    }

    /// Mutable access to the object attached under `name`, if it is a `T`.
    pub fn attached_object_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.attachments.get_mut(name)?.downcast_mut()
    }

    /// Remove and return the object attached under `name`.
    pub fn detach_object(&mut self, name: &str) -> Option<Box<dyn Any>> {
        self.attachments.remove(name)
    }
}

impl fmt::Debug for ShaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderState")
            .field("token", &self.token)
            .field("program", &self.program_name())
            .field("reset_required", &self.reset_required)
            .field("attrib_locations", &self.active_attrib_locations)
            .field("enabled_attribs", &self.enabled_attribs)
            .field("managed_attribs", &self.managed_attribs.len())
            .field("uniforms", &self.active_uniforms.keys().collect::<Vec<_>>())
            .field("attachments", &self.attachments.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ShaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ShaderState[program={:?}, in_use={}, attribs={}, managed={}, uniforms={}]",
            self.program_name(),
            self.in_use(),
            self.active_attribs.len(),
            self.managed_attribs.len(),
            self.active_uniforms.len()
        )
    }
}
