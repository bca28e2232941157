//! The thin layer applications drive per frame.
//!
//! A windowing layer implements [`Surface`] and calls a [`RenderListener`]'s
//! `init`, `reshape`, `display` and `dispose` with the context current.
//! [`ShaderPass`] bundles one [`ShaderState`] with the streams and uniforms
//! it draws and performs the per-frame order: bind program, enable streams,
//! push uniforms, draw, disable streams, unbind program.

use std::rc::Rc;

use crate::array_data::GlArrayData;
use crate::error::{Error, Result};
use crate::gpu::Gpu;
use crate::shader::{ShaderState, SharedArray, SharedProgram, SharedUniform};

/// A drawable with a current GL context.
pub trait Surface {
    /// Command sink for the surface's context.
    fn gpu(&self) -> &dyn Gpu;

    /// Drawable size in pixels, `[width, height]`.
    fn size(&self) -> [u32; 2];
}

/// A rectangle in window coordinates (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[expect(missing_docs)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    /// The whole of a `[width, height]` surface.
    pub fn from_size(size: [u32; 2]) -> Self {
        Self {
            x: 0,
            y: 0,
            width: i32::try_from(size[0]).unwrap_or(i32::MAX),
            height: i32::try_from(size[1]).unwrap_or(i32::MAX),
        }
    }

    /// Width over height, `1.0` for a degenerate viewport.
    pub fn aspect(&self) -> f32 {
        if self.height <= 0 {
            return 1.0;
        }
        #[expect(clippy::cast_precision_loss)]
        let aspect = self.width as f32 / self.height as f32;
        aspect
    }
}

/// Callbacks a windowing layer invokes with the context current.
pub trait RenderListener {
    /// Create programs and buffers.
    ///
    /// # Errors
    ///
    /// Failures creating GPU resources.
    fn init(&mut self, surface: &dyn Surface) -> Result<()>;

    /// The drawable changed size.
    ///
    /// # Errors
    ///
    /// Failures updating GPU state.
    fn reshape(&mut self, _surface: &dyn Surface, _viewport: Viewport) -> Result<()> {
        Ok(())
    }

    /// Render one frame.
    ///
    /// # Errors
    ///
    /// Failures issuing the frame.
    fn display(&mut self, surface: &dyn Surface) -> Result<()>;

    /// Release every GPU resource.
    ///
    /// # Errors
    ///
    /// Failures releasing GPU resources.
    fn dispose(&mut self, surface: &dyn Surface) -> Result<()>;
}

/// One program plus the streams and uniforms drawn with it.
#[derive(Debug)]
pub struct ShaderPass {
    state: ShaderState,
    arrays: Vec<SharedArray>,
    indices: Option<GlArrayData>,
    uniforms: Vec<SharedUniform>,
    mode: u32,
}

impl ShaderPass {
    /// Attach `program` to a fresh shader state (linking it) and draw with
    /// primitive `mode` (`glow::TRIANGLES`, ...).
    ///
    /// # Errors
    ///
    /// Compile and link failures.
    pub fn new(gpu: &dyn Gpu, program: SharedProgram, mode: u32) -> Result<Self> {
        let mut state = ShaderState::new();
        state.attach_shader_program(gpu, program, true)?;
        state.use_program(gpu, false)?;
        Ok(Self {
            state,
            arrays: Vec::new(),
            indices: None,
            uniforms: Vec::new(),
            mode,
        })
    }

    /// The pass's shader state.
    pub fn state(&self) -> &ShaderState {
        &self.state
    }

    /// Mutable access to the pass's shader state.
    pub fn state_mut(&mut self) -> &mut ShaderState {
        &mut self.state
    }

    /// Add an attribute stream, managed by the pass's state. The first stream
    /// determines the vertex count of non-indexed draws.
    pub fn add_array(&mut self, array: SharedArray) {
        self.state.manage_array(&array, true);
        self.arrays.push(array);
    }

    /// Draw indexed through `indices` (an index array) from now on.
    pub fn set_indices(&mut self, indices: GlArrayData) {
        self.indices = Some(indices);
    }

    /// Mutable access to the index array.
    pub fn indices_mut(&mut self) -> Option<&mut GlArrayData> {
        self.indices.as_mut()
    }

    /// Add a uniform, managed by the pass's state.
    pub fn add_uniform(&mut self, uniform: SharedUniform) {
        self.state.manage_uniform(&uniform, true);
        self.uniforms.push(uniform);
    }

    /// The uniform called `name`.
    pub fn uniform(&self, name: &str) -> Option<SharedUniform> {
        self.uniforms
            .iter()
            .find(|u| u.borrow().name() == name)
            .map(Rc::clone)
    }

    /// Draw once. Every stream must be sealed.
    ///
    /// # Errors
    ///
    /// *invalid-state* with no streams or an unsealed one; failures from the
    /// shader state and the draw.
    pub fn draw(&mut self, gpu: &dyn Gpu) -> Result<()> {
        let Some(first) = self.arrays.first() else {
            return Err(Error::invalid_state("shader pass has no attribute streams"));
        };
        let first = Rc::clone(first);
        self.state.use_program(gpu, true)?;
        for array in &self.arrays {
            array
                .borrow_mut()
                .enable_buffer(gpu, Some(&mut self.state), true)?;
        }
        self.state.push_all_uniforms(gpu)?;
        match &mut self.indices {
            Some(indices) => {
                indices.enable_buffer(gpu, None, true)?;
                indices.draw_elements(gpu, self.mode)?;
                indices.enable_buffer(gpu, None, false)?;
            }
            None => first.borrow().draw_arrays(gpu, self.mode)?,
        }
        for array in &self.arrays {
            array
                .borrow_mut()
                .enable_buffer(gpu, Some(&mut self.state), false)?;
        }
        self.state.use_program(gpu, false)
    }

    /// Destroy the program, its owned codes, every stream and the index array.
    ///
    /// # Errors
    ///
    /// Failures from [`ShaderState::destroy`].
    pub fn destroy(&mut self, gpu: &dyn Gpu) -> Result<()> {
        self.state.destroy(gpu)?;
        if let Some(mut indices) = self.indices.take() {
            indices.destroy(gpu);
        }
        self.arrays.clear();
        self.uniforms.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::array_data::VboUsage;
    use crate::data_type::ComponentType;
    use crate::gpu::mock::{Call, MockGpu};
    use crate::gpu::ContextInfo;
    use crate::shader::{GlUniformData, ShaderCode, ShaderProgram, ShaderStage, UniformValue};

    struct TestSurface {
        gpu: MockGpu,
    }

    impl Surface for TestSurface {
        fn gpu(&self) -> &dyn Gpu {
            &self.gpu
        }

        fn size(&self) -> [u32; 2] {
            [640, 480]
        }
    }

    #[derive(Default)]
    struct Triangle {
        pass: Option<ShaderPass>,
        aspect: f32,
    }

    impl RenderListener for Triangle {
        fn init(&mut self, surface: &dyn Surface) -> Result<()> {
            let gpu = surface.gpu();
            let mut program = ShaderProgram::new();
            program.add(
                Rc::new(RefCell::new(ShaderCode::from_text(
                    ShaderStage::Vertex,
                    "attribute vec2 pos;\nuniform vec4 color;\nvoid main(){}\n",
                ))),
                true,
            );
            program.add(
                Rc::new(RefCell::new(ShaderCode::from_text(
                    ShaderStage::Fragment,
                    "void main(){}\n",
                ))),
                true,
            );
            let mut pass = ShaderPass::new(gpu, Rc::new(RefCell::new(program)), glow::TRIANGLES)?;

            let mut pos =
                GlArrayData::server("pos", 2, ComponentType::Float, false, 0, 3, VboUsage::Static)?;
            pos.put(&[0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0])?;
            pos.seal(true);
            pass.add_array(Rc::new(RefCell::new(pos)));
            pass.add_uniform(Rc::new(RefCell::new(GlUniformData::new(
                "color",
                UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]),
            ))));
            self.pass = Some(pass);
            Ok(())
        }

        fn reshape(&mut self, _surface: &dyn Surface, viewport: Viewport) -> Result<()> {
            self.aspect = viewport.aspect();
            Ok(())
        }

        fn display(&mut self, surface: &dyn Surface) -> Result<()> {
            match &mut self.pass {
                Some(pass) => pass.draw(surface.gpu()),
                None => Err(Error::invalid_state("not initialized")),
            }
        }

        fn dispose(&mut self, surface: &dyn Surface) -> Result<()> {
            match self.pass.take() {
                Some(mut pass) => pass.destroy(surface.gpu()),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn test_listener_frame_order() {
        let surface = TestSurface {
            gpu: MockGpu::new(ContextInfo::es2()),
        };
        let mut listener = Triangle::default();
        listener.init(&surface).expect("init");
        listener
            .reshape(&surface, Viewport::from_size(surface.size()))
            .expect("reshape");
        assert!((listener.aspect - 640.0 / 480.0).abs() < f32::EPSILON);

        surface.gpu.clear_calls();
        listener.display(&surface).expect("display");
        let calls = surface.gpu.calls();
        let pos = |pred: &dyn Fn(&Call) -> bool| {
            calls.iter().position(pred).expect("call present")
        };
        let use_program = pos(&|c| matches!(c, Call::UseProgram(p) if *p != 0));
        let enable = pos(&|c| matches!(c, Call::EnableVertexAttribArray(0)));
        let uniform = pos(&|c| matches!(c, Call::UniformF32 { location: 0, .. }));
        let draw = pos(&|c| *c == Call::DrawArrays { mode: glow::TRIANGLES, first: 0, count: 3 });
        let disable = pos(&|c| matches!(c, Call::DisableVertexAttribArray(0)));
        let unuse = pos(&|c| matches!(c, Call::UseProgram(0)));
        assert!(use_program < enable && enable < uniform && uniform < draw);
        assert!(draw < disable && disable < unuse);

        surface.gpu.clear_calls();
        listener.display(&surface).expect("second frame");
        assert_eq!(
            surface
                .gpu
                .count(|c| matches!(c, Call::BufferData { .. })),
            0
        );

        listener.dispose(&surface).expect("dispose");
        assert!(listener.pass.is_none());
    }

    #[test]
    fn test_indexed_pass() {
        let gpu = MockGpu::new(ContextInfo::es2());
        let mut program = ShaderProgram::new();
        program.add(
            Rc::new(RefCell::new(ShaderCode::from_text(
                ShaderStage::Vertex,
                "attribute vec2 pos;\nvoid main(){}\n",
            ))),
            true,
        );
        let mut pass =
            ShaderPass::new(&gpu, Rc::new(RefCell::new(program)), glow::TRIANGLES).expect("pass");
        assert!(matches!(pass.draw(&gpu), Err(Error::InvalidState(_))));

        let mut quad = GlArrayData::server("pos", 2, ComponentType::Float, false, 0, 4, VboUsage::Static)
            .expect("pos");
        quad.put(&[0.0f32, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]).expect("put");
        quad.seal(true);
        pass.add_array(Rc::new(RefCell::new(quad)));

        let mut indices =
            GlArrayData::server_index(1, ComponentType::UnsignedShort, 6, VboUsage::Static)
                .expect("indices");
        indices.put(&[0u16, 1, 2, 0, 2, 3]).expect("put");
        indices.seal(true);
        pass.set_indices(indices);

        gpu.clear_calls();
        pass.draw(&gpu).expect("draw");
        assert!(gpu.calls().contains(&Call::DrawElements {
            mode: glow::TRIANGLES,
            count: 6,
            element_type: glow::UNSIGNED_SHORT,
            offset: 0,
        }));
        let index_vbo = pass.indices_mut().map_or(0, |i| i.vbo_name());
        assert_ne!(index_vbo, 0);

        pass.destroy(&gpu).expect("destroy");
        assert!(!gpu.buffer_exists(index_vbo));
    }
}
