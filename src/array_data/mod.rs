//! Vertex attribute streams.
//!
//! An attribute stream is described by an [`ArrayData`] (name, component
//! layout, stride and VBO identity) and backed by a [`GlArrayData`], which
//! owns the CPU-side [`ComponentBuffer`], the seal/enable/written state
//! machine and the [`AttributeHandler`](crate::handler::AttributeHandler)
//! that feeds it to the pipeline.
//!
//! ```text
//!  put*()  ──▶ UNSEALED ──seal(true)──▶ SEALED ──enable_buffer(true)──▶ ENABLED
//!               ▲   ▲                     │                               │
//!               │   └──────seal(false)────┘        enable_buffer(false) ──┘
//!               └── clear()
//! ```
//!
//! Server-side streams additionally own a VBO, may be split into interleaved
//! sub-arrays, and may be written through mapped GPU storage instead of a CPU
//! buffer.

mod buffer;
mod client;
mod server;
mod wrapper;

pub use buffer::ComponentBuffer;
pub use client::{GlArrayData, DEFAULT_GROWTH_FACTOR};
pub use server::MappedStorage;
pub use wrapper::{ArrayData, VboState, VboTarget, VboUsage};

/// Reserved attribute name for index (element array) buffers.
pub const INDEX_ARRAY_NAME: &str = "mgl_IndexArray";

/// Reserved attribute name for the parent of interleaved sub-arrays.
pub const INTERLEAVED_ARRAY_NAME: &str = "mgl_InterleaveArray";
