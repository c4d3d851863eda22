//! Strata
//!
//! Scene-graph render orchestration for 2D engines. A tree of nodes is
//! partitioned into render groups, each with its own transform space and
//! instruction set. Per frame, only the nodes that changed are propagated,
//! and a group's instructions are rebuilt only when its structure changed.
//!
//! ```text
//!   Scene (nodes, render groups)          Renderer
//!   ────────────────────────────          ──────────────────────────────
//!   setters ──► dirty flags + buckets ──► propagate ──► validate / rebuild
//!                                                      ──► upload ──► execute
//! ```
//!
//! The GPU side lives behind [`RenderBackend`], [`RenderPipe`] and
//! [`TexturePool`].

#![forbid(unsafe_code)]

pub mod errors;
pub mod renderer;
pub mod scene;
pub mod utils;

pub use errors::{Result, StrataError};
pub use renderer::{
    EffectPipe, FrameStats, GroupUniforms, Instruction, InstructionSet, PipeId, PooledTextures, RenderBackend,
    RenderPipe, RenderPipes, Renderer, RendererSettings, TextureId, TexturePool,
};
pub use scene::{
    BlendMode, CacheAsTextureOptions, Effect, Node, NodeHandle, Rect, RenderGroup, RenderGroupHandle, Scene, View,
};
pub use utils::Tint;
