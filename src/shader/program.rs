//! A GL program object assembled from shader codes.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::SharedCode;
use crate::debug::debug_code;
use crate::error::{Error, Result};
use crate::gpu::Gpu;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug)]
struct Stage {
    code: SharedCode,
    /// Destroyed together with the program.
    owned: bool,
    /// Its shader objects are attached to the GL program.
    attached: bool,
}

/// A set of shader codes linked into one GL program.
///
/// Two programs are equal iff they have the same id.
#[derive(Debug)]
pub struct ShaderProgram {
    id: u32,
    program: u32,
    stages: Vec<Stage>,
    linked: bool,
    in_use: bool,
}

impl Default for ShaderProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderProgram {
    /// An empty program; the GL object is created lazily.
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            program: 0,
            stages: Vec::new(),
            linked: false,
            in_use: false,
        }
    }

    /// Process-wide unique id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// GL program name, `0` before the first [`init`](Self::init) or link.
    pub fn program_name(&self) -> u32 {
        self.program
    }

    /// Whether the last link succeeded and no stage changed since.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Whether this program is the one bound with `glUseProgram`.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// The shader codes, in the order they were added.
    pub fn shader_codes(&self) -> impl Iterator<Item = &SharedCode> {
        self.stages.iter().map(|s| &s.code)
    }

    /// Whether `code` is one of this program's stages.
    pub fn contains(&self, code: &SharedCode) -> bool {
        self.stages.iter().any(|s| Rc::ptr_eq(&s.code, code))
    }

    /// Add a stage. With `own`, the code is destroyed when the program is
    /// released with code destruction.
    ///
    /// Returns `false` if the code is already part of the program.
    pub fn add(&mut self, code: SharedCode, own: bool) -> bool {
        if self.contains(&code) {
            return false;
        }
        self.stages.push(Stage {
            code,
            owned: own,
            attached: false,
        });
        self.linked = false;
        true
    }

    /// Create the GL program object if needed and return its name.
    ///
    /// # Errors
    ///
    /// Driver failures from program creation.
    pub fn init(&mut self, gpu: &dyn Gpu) -> Result<u32> {
        if self.program == 0 {
            self.program = gpu.create_program()?;
        }
        Ok(self.program)
    }

    /// Compile every stage, attach the ones not attached yet, and link.
    ///
    /// # Errors
    ///
    /// *compile* from the first stage that fails to compile, *link* with the
    /// program info log when linking fails.
    pub fn link(&mut self, gpu: &dyn Gpu) -> Result<()> {
        let program = self.init(gpu)?;
        for stage in &mut self.stages {
            let mut code = stage.code.borrow_mut();
            code.compile(gpu)?;
            if !stage.attached {
                for &shader in code.shader_names() {
                    gpu.attach_shader(program, shader);
                }
                stage.attached = true;
            }
        }
        gpu.link_program(program);
        self.linked = gpu.program_link_status(program);
        if !self.linked {
            let log = gpu.program_info_log(program);
            self.report_link_failure(&log);
            return Err(Error::Link { id: self.id, log });
        }
        log::debug!("linked {self}");
        Ok(())
    }

    fn report_link_failure(&self, info_log: &str) {
        if debug_code() {
            let sources: String = self
                .stages
                .iter()
                .map(|s| s.code.borrow().dump_source())
                .collect();
            log::error!("program {} failed to link:\n{info_log}\n{sources}", self.id);
        } else {
            log::error!(
                "program {} failed to link: {}",
                self.id,
                info_log.lines().next().unwrap_or_default()
            );
        }
    }

    /// Bind (`true`) or unbind the program.
    ///
    /// # Errors
    ///
    /// *invalid-state* when binding a program that is not linked.
    pub fn use_program(&mut self, gpu: &dyn Gpu, on: bool) -> Result<()> {
        if on {
            if !self.linked {
                return Err(Error::invalid_state(format!(
                    "program {} is not linked",
                    self.id
                )));
            }
            gpu.use_program(self.program);
        } else {
            gpu.use_program(0);
        }
        self.in_use = on;
        Ok(())
    }

    /// Forget the in-use flag without unbinding; another program is about to
    /// be bound over this one.
    pub fn notify_not_in_use(&mut self) {
        self.in_use = false;
    }

    /// Detach every stage and delete the GL program. With `destroy_code`,
    /// owned shader codes are destroyed as well.
    pub fn release(&mut self, gpu: &dyn Gpu, destroy_code: bool) {
        if self.in_use {
            gpu.use_program(0);
            self.in_use = false;
        }
        for stage in self.stages.drain(..) {
            let mut code = stage.code.borrow_mut();
            if stage.attached && self.program != 0 {
                for &shader in code.shader_names() {
                    gpu.detach_shader(self.program, shader);
                }
            }
            if destroy_code && stage.owned {
                code.destroy(gpu);
            }
        }
        if self.program != 0 {
            gpu.delete_program(self.program);
            log::debug!("released program {} (gl {})", self.id, self.program);
            self.program = 0;
        }
        self.linked = false;
    }

    /// Swap stage `old` for `new`, which is compiled first.
    ///
    /// The program is unbound if in use and has to be linked again; a shader
    /// state does that on its next `use_program(true)`. Returns `false` when
    /// `old` is not a stage of this program.
    ///
    /// # Errors
    ///
    /// *compile* when `new` fails to compile; the program is unchanged then.
    pub fn replace_shader_code(
        &mut self,
        gpu: &dyn Gpu,
        old: &SharedCode,
        new: SharedCode,
        own: bool,
    ) -> Result<bool> {
        let Some(index) = self.stages.iter().position(|s| Rc::ptr_eq(&s.code, old)) else {
            return Ok(false);
        };
        new.borrow_mut().compile(gpu)?;
        if self.in_use {
            self.use_program(gpu, false)?;
        }
        let stage = self.stages.remove(index);
        if stage.attached && self.program != 0 {
            for &shader in stage.code.borrow().shader_names() {
                gpu.detach_shader(self.program, shader);
            }
        }
        self.stages.push(Stage {
            code: new,
            owned: own,
            attached: false,
        });
        self.linked = false;
        Ok(true)
    }
}

impl PartialEq for ShaderProgram {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ShaderProgram {}

impl fmt::Display for ShaderProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<u32> = self.stages.iter().map(|s| s.code.borrow().id()).collect();
        write!(
            f,
            "ShaderProgram[id={}, gl={}, linked={}, in_use={}, codes={codes:?}]",
            self.id, self.program, self.linked, self.in_use
        )
    }
}
