//! Instruction Set
//!
//! The flat, ordered output of an instruction build for one render group.
//!
//! ```text
//! [BlendMode(Normal), Batch(a), Batch(b), PushEffect(mask), Batch(c),
//!  PopEffect(mask), RenderGroup(g2), BlendMode(Add), Batch(d)]
//! ```
//!
//! A set is reset and repopulated by a full rebuild, or left untouched when
//! the frame takes the validation fast path. Nested render groups appear as a
//! single [`Instruction::RenderGroup`] entry; their own instructions live in
//! their own set.

use crate::renderer::pipe::PipeId;
use crate::scene::node::{BlendMode, Effect};
use crate::scene::{NodeHandle, RenderGroupHandle};

/// One entry of an [`InstructionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Add the node's renderable to the current batch of `pipe`.
    Batch { pipe: PipeId, node: NodeHandle },
    /// Draw the node through `pipe` outside of batching. Never emitted by
    /// the builder itself; pipes push it from
    /// [`RenderPipe::add_renderable`](crate::renderer::RenderPipe::add_renderable)
    /// for renderables that cannot share a batch.
    Draw { pipe: PipeId, node: NodeHandle },
    /// Switch the active blend mode.
    BlendMode(BlendMode),
    /// Open an effect scope around the following instructions.
    PushEffect { pipe: PipeId, node: NodeHandle, effect: Effect },
    /// Close the most recently opened effect scope.
    PopEffect { pipe: PipeId, node: NodeHandle, effect: Effect },
    /// Execute the instruction set of a nested render group.
    RenderGroup(RenderGroupHandle),
}

impl Instruction {
    /// The renderable node drawn by this instruction, if any.
    #[inline]
    #[must_use]
    pub fn renderable(&self) -> Option<NodeHandle> {
        match *self {
            Self::Batch { node, .. } | Self::Draw { node, .. } => Some(node),
            _ => None,
        }
    }
}

/// Ordered instruction list owned by exactly one render group.
#[derive(Debug, Clone, Default)]
pub struct InstructionSet {
    instructions: Vec<Instruction>,
}

impl InstructionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the set, retaining its allocation.
    pub fn reset(&mut self) {
        self.instructions.clear();
    }

    #[inline]
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Shorthand for pushing [`Instruction::Batch`].
    #[inline]
    pub fn add_to_batch(&mut self, pipe: PipeId, node: NodeHandle) {
        self.push(Instruction::Batch { pipe, node });
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Renderable nodes in draw order.
    pub fn renderables(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.instructions.iter().filter_map(Instruction::renderable)
    }

    /// Number of batch and draw instructions.
    #[must_use]
    pub fn renderable_count(&self) -> usize {
        self.renderables().count()
    }

    /// Nested render groups referenced by this set, in order.
    pub fn render_groups(&self) -> impl Iterator<Item = RenderGroupHandle> + '_ {
        self.instructions.iter().filter_map(|instruction| match *instruction {
            Instruction::RenderGroup(group) => Some(group),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a InstructionSet {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
