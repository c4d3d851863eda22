//! Renderable GC
//!
//! Tracks the last frame each renderable was executed. Renderables that go
//! unused for longer than [`RenderableGcSettings::max_unused_frames`] are
//! reported so their pipe can release them; the frame driver then marks
//! their group for rebuild so they are re-added if they come back.

use rustc_hash::FxHashMap;

use crate::renderer::pipe::PipeId;
use crate::renderer::settings::RenderableGcSettings;
use crate::scene::NodeHandle;

pub trait RenderableGc {
    /// Registers a renderable emitted by an instruction build.
    fn add_renderable(&mut self, node: NodeHandle, pipe: PipeId);

    /// Records that the renderable was executed this frame.
    fn mark_used(&mut self, node: NodeHandle);

    /// Stops tracking a renderable that was destroyed.
    fn forget(&mut self, node: NodeHandle);

    /// Ends the frame, appending expired renderables to `expired`.
    fn collect(&mut self, expired: &mut Vec<(NodeHandle, PipeId)>);
}

/// Frame-counting [`RenderableGc`].
#[derive(Debug, Default)]
pub struct RenderableGcSystem {
    settings: RenderableGcSettings,
    frame: u64,
    last_used: FxHashMap<NodeHandle, (PipeId, u64)>,
}

impl RenderableGcSystem {
    #[must_use]
    pub fn new(settings: RenderableGcSettings) -> Self {
        Self {
            settings,
            frame: 0,
            last_used: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[must_use]
    pub fn is_tracked(&self, node: NodeHandle) -> bool {
        self.last_used.contains_key(&node)
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.last_used.len()
    }
}

impl RenderableGc for RenderableGcSystem {
    fn add_renderable(&mut self, node: NodeHandle, pipe: PipeId) {
        self.last_used.insert(node, (pipe, self.frame));
    }

    fn mark_used(&mut self, node: NodeHandle) {
        if let Some((_, last)) = self.last_used.get_mut(&node) {
            *last = self.frame;
        }
    }

    fn forget(&mut self, node: NodeHandle) {
        self.last_used.remove(&node);
    }

    fn collect(&mut self, expired: &mut Vec<(NodeHandle, PipeId)>) {
        self.frame += 1;
        if !self.settings.enabled || self.settings.frequency == 0 || self.frame % self.settings.frequency != 0 {
            return;
        }

        let now = self.frame;
        let max_unused = self.settings.max_unused_frames;
        self.last_used.retain(|&node, &mut (pipe, last)| {
            let keep = now - last <= max_unused;
            if !keep {
                expired.push((node, pipe));
            }
            keep
        });
        log::trace!("renderable gc at frame {now}: {} expired", expired.len());
    }
}
