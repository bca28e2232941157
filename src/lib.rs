//! GLSL shader program lifecycle and vertex array data for OpenGL via [glow].
//!
//! This crate manages the pieces between raw GL calls and an application's
//! draw loop: shader code loaded from sources or binaries and customized for
//! the running context, programs linked from that code, and a
//! [`ShaderState`] that keeps attribute locations, enabled vertex streams and
//! uniforms consistent while programs are swapped. Vertex streams are
//! [`GlArrayData`] values that fill a CPU buffer, seal, and upload into a VBO
//! (optionally interleaved or mapped) the first time they are enabled.
//!
//! # Features
//!
//! - **Context-aware preludes**: `#version`, default precision and feature
//!   defines are inserted according to the context's profile.
//! - **`#include` expansion** with cycle detection when reading sources
//!   through an [`AssetResolver`].
//! - **Location caching**: attribute locations survive a program switch and
//!   are re-bound before the next link.
//! - **Interleaved and mapped VBOs**, index buffers and client-side arrays.
//! - **Pixel-store arithmetic** for transfer sizes, plus framebuffer
//!   read-back into an [`image::RgbaImage`].
//!
//! # Safety
//!
//! Every operation takes a `&dyn` [`Gpu`] whose context must be current on
//! the calling thread. Nothing here is `Send`; objects are shared through
//! `Rc<RefCell<_>>` and stay on the GL thread.
//!
//! [glow]: https://docs.rs/glow

pub mod array_data;
pub mod asset;
pub mod data_type;
pub mod debug;
mod error;
pub mod facade;
pub mod gpu;
pub mod handler;
pub mod pixel;
mod readback;
pub mod shader;

pub use array_data::{ArrayData, GlArrayData, VboTarget, VboUsage};
pub use asset::{AssetResolver, FileAssets, MemoryAssets};
pub use data_type::ComponentType;
pub use error::{Error, Result};
pub use facade::{RenderListener, ShaderPass, Surface, Viewport};
#[cfg(not(target_arch = "wasm32"))]
pub use gpu::GlowGpu;
pub use gpu::{ContextInfo, GlProfile, Gpu};
pub use readback::read_framebuffer;
pub use shader::{
    GlUniformData, ShaderCode, ShaderProgram, ShaderStage, ShaderState, UniformValue,
};
