//! Window table and depth model.
//!
//! One [`ManagedWindow`] per client window the X server told us about,
//! keyed by its resource id. The table is the single authority on what
//! gets composited; GPU handles live inside the entry and are released
//! before the entry is erased.

use std::collections::{HashMap, HashSet};

use opal_proto::WinType;

/// Render depth of the base window. Everything else stacks in front.
pub const BASE_DEPTH: f64 = 0.9;

/// Depth assigned to a window the shell has not ordered yet.
pub const DEFAULT_DEPTH: f64 = 0.1;

/// Topmost depth handed out by a reorder; the rest of the list descends
/// from here in even steps.
pub const REORDER_TOP: f64 = 0.8;

/// Pixel geometry: signed origin, unsigned extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && py >= self.y
            && px < self.x + self.width as i32
            && py < self.y + self.height as i32
    }
}

/// Chrome border in window-local offsets: `x`/`y` shift the top-left
/// corner, `width`/`height` extend the extent. All four may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Border {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Per-window compositor record.
#[derive(Debug)]
pub struct ManagedWindow {
    pub id: u32,
    pub exists: bool,
    pub visible: bool,
    pub geometry: Geometry,
    pub depth: f64,
    pub opacity: f32,
    pub name: Option<String>,
    pub border: Option<Border>,
    pub win_type: WinType,

    /// Composite pixmap naming the window contents; 0 when unbound.
    pub x_pixmap: u32,
    /// GLX pixmap wrapping `x_pixmap` for texture-from-pixmap; 0 when unbound.
    pub glx_pixmap: u64,

    // Full-window quad mesh, created once per window.
    pub vao: u32,
    pub vbo: u32,
    pub ibo: u32,
    pub index_count: i32,
}

impl ManagedWindow {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            exists: true,
            visible: false,
            geometry: Geometry::default(),
            depth: DEFAULT_DEPTH,
            opacity: 1.0,
            name: None,
            border: None,
            win_type: WinType::Normal,
            x_pixmap: 0,
            glx_pixmap: 0,
            vao: 0,
            vbo: 0,
            ibo: 0,
            index_count: 0,
        }
    }

    pub fn renderable(&self) -> bool {
        self.exists && self.visible && self.geometry.width > 0 && self.geometry.height > 0
    }
}

/// The compositor's mutable world, threaded explicitly through every
/// handler. Single-threaded by construction; no locking anywhere.
#[derive(Debug, Default)]
pub struct CompositorState {
    pub windows: HashMap<u32, ManagedWindow>,
    /// Windows the compositor created for itself; never managed.
    pub blacklist: HashSet<u32>,
    /// The shell's full-screen surface, if it has announced itself.
    pub base_window: Option<u32>,
    /// Last focused non-base client.
    pub focused: Option<u32>,
    /// Monotonic frame counter, reported in `render_reply`.
    pub frame: u64,
}

impl CompositorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh entry for a newly created window.
    ///
    /// Returns `None` for blacklisted ids (our own overlay, output and
    /// support windows must never become clients).
    pub fn insert(&mut self, id: u32) -> Option<&mut ManagedWindow> {
        if self.blacklist.contains(&id) {
            return None;
        }
        Some(self.windows.entry(id).or_insert_with(|| ManagedWindow::new(id)))
    }

    pub fn is_base(&self, id: u32) -> bool {
        self.base_window == Some(id)
    }

    /// Client ids for `_NET_CLIENT_LIST`.
    pub fn client_ids(&self) -> Vec<u32> {
        self.windows.keys().copied().collect()
    }

    /// Remove an entry, clearing focus and base designation that point
    /// at it. GPU handles must already have been released by the caller.
    pub fn remove(&mut self, id: u32) -> Option<ManagedWindow> {
        if self.focused == Some(id) {
            self.focused = None;
        }
        if self.base_window == Some(id) {
            self.base_window = None;
        }
        self.windows.remove(&id)
    }

    /// Apply a shell ordering: front of the list gets depth
    /// [`REORDER_TOP`], each following window steps back by
    /// `REORDER_TOP / len`. Ids we do not manage are skipped without
    /// consuming a slot; the base window keeps its depth no matter what
    /// the shell sends.
    pub fn apply_reorder(&mut self, ids: &[u32]) {
        if ids.is_empty() {
            return;
        }
        let step = REORDER_TOP / ids.len() as f64;
        let mut depth = REORDER_TOP;
        for &id in ids {
            if self.is_base(id) {
                continue;
            }
            let Some(win) = self.windows.get_mut(&id) else {
                tracing::debug!("reorder skipped unknown window {}", id);
                continue;
            };
            win.depth = depth;
            depth -= step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(ids: &[u32]) -> CompositorState {
        let mut state = CompositorState::new();
        for &id in ids {
            state.insert(id).unwrap();
        }
        state
    }

    #[test]
    fn test_reorder_descends_from_top() {
        // Windows B, A, C reordered front-to-back.
        let (a, b, c) = (10, 11, 12);
        let mut state = state_with(&[a, b, c]);
        state.apply_reorder(&[b, a, c]);

        let step = REORDER_TOP / 3.0;
        assert!((state.windows[&b].depth - REORDER_TOP).abs() < 1e-9);
        assert!((state.windows[&a].depth - (REORDER_TOP - step)).abs() < 1e-9);
        assert!((state.windows[&c].depth - (REORDER_TOP - 2.0 * step)).abs() < 1e-9);
        // Front of list = smaller depth than everything behind it.
        assert!(state.windows[&b].depth > state.windows[&a].depth);
        assert!(state.windows[&a].depth > state.windows[&c].depth);
    }

    #[test]
    fn test_reorder_unknown_id_consumes_no_slot() {
        let mut state = state_with(&[1, 2]);
        state.apply_reorder(&[99, 1, 2]);
        let step = REORDER_TOP / 3.0;
        assert!((state.windows[&1].depth - REORDER_TOP).abs() < 1e-9);
        assert!((state.windows[&2].depth - (REORDER_TOP - step)).abs() < 1e-9);
    }

    #[test]
    fn test_reorder_never_touches_base() {
        let mut state = state_with(&[1, 2]);
        state.base_window = Some(1);
        state.windows.get_mut(&1).unwrap().depth = BASE_DEPTH;
        state.apply_reorder(&[1, 2]);
        assert_eq!(state.windows[&1].depth, BASE_DEPTH);
        // All managed, non-base depths stay strictly in front of the base.
        assert!(state.windows[&2].depth < BASE_DEPTH);
    }

    #[test]
    fn test_windows_not_in_list_keep_depth() {
        let mut state = state_with(&[1, 2, 3]);
        state.windows.get_mut(&3).unwrap().depth = 0.42;
        state.apply_reorder(&[1, 2]);
        assert_eq!(state.windows[&3].depth, 0.42);
    }

    #[test]
    fn test_blacklisted_never_inserted() {
        let mut state = CompositorState::new();
        state.blacklist.insert(77);
        assert!(state.insert(77).is_none());
        assert!(!state.windows.contains_key(&77));
    }

    #[test]
    fn test_remove_clears_focus_and_base() {
        let mut state = state_with(&[5]);
        state.focused = Some(5);
        state.base_window = Some(5);
        state.remove(5);
        assert_eq!(state.focused, None);
        assert_eq!(state.base_window, None);
        assert!(state.windows.is_empty());
    }
}
