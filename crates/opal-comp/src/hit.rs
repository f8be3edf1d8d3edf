//! Pointer hit testing against window contents and chrome borders.
//!
//! A registered border is additive: `(bx, by)` offsets the top-left
//! corner of the window and `(bw, bh)` extends its extent, so the
//! border's screen rectangle is
//! `[wx+bx, wy+by] x [wx+W+bw, wy+H+bh]`. The band between that
//! rectangle and the content rectangle is the chrome region the shell
//! draws into.

use crate::windows::{Border, CompositorState, Geometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Content,
    Border,
}

#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub window: u32,
    pub kind: HitKind,
    pub depth: f64,
}

/// Half-open screen rectangle `[x0, y0) .. (x1, y1)` of a border.
pub fn border_screen_rect(geometry: &Geometry, border: &Border) -> (i32, i32, i32, i32) {
    (
        geometry.x + border.x,
        geometry.y + border.y,
        geometry.x + geometry.width as i32 + border.width,
        geometry.y + geometry.height as i32 + border.height,
    )
}

fn rect_contains(rect: (i32, i32, i32, i32), px: i32, py: i32) -> bool {
    px >= rect.0 && py >= rect.1 && px < rect.2 && py < rect.3
}

/// Find the winning hit for a screen coordinate.
///
/// Every visible managed window contributes a content hit when the
/// point is inside its geometry; windows with a registered border also
/// contribute a border hit when the point lies in the chrome band. The
/// winner is the minimum-depth hit, content beating border on equal
/// depth.
pub fn hit_test(state: &CompositorState, px: i32, py: i32) -> Option<Hit> {
    let mut best: Option<Hit> = None;

    for win in state.windows.values() {
        if !win.exists || !win.visible {
            continue;
        }
        let depth = if state.is_base(win.id) {
            crate::windows::BASE_DEPTH
        } else {
            win.depth
        };

        let kind = if win.geometry.contains(px, py) {
            Some(HitKind::Content)
        } else if let Some(border) = &win.border {
            rect_contains(border_screen_rect(&win.geometry, border), px, py)
                .then_some(HitKind::Border)
        } else {
            None
        };

        let Some(kind) = kind else { continue };

        let wins = match &best {
            None => true,
            Some(current) => {
                depth < current.depth
                    || (depth == current.depth
                        && kind == HitKind::Content
                        && current.kind == HitKind::Border)
            }
        };
        if wins {
            best = Some(Hit {
                window: win.id,
                kind,
                depth,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windows::ManagedWindow;

    fn window(id: u32, x: i32, y: i32, w: u32, h: u32, depth: f64) -> ManagedWindow {
        let mut win = ManagedWindow::new(id);
        win.visible = true;
        win.geometry = Geometry {
            x,
            y,
            width: w,
            height: h,
        };
        win.depth = depth;
        win
    }

    fn state_of(windows: Vec<ManagedWindow>) -> CompositorState {
        let mut state = CompositorState::new();
        for win in windows {
            state.windows.insert(win.id, win);
        }
        state
    }

    #[test]
    fn test_border_rect_wraps_content() {
        // A 10px frame around a 100x100 window at the origin.
        let geometry = Geometry {
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        };
        let border = Border {
            x: -10,
            y: -10,
            width: 20,
            height: 20,
        };
        assert_eq!(border_screen_rect(&geometry, &border), (-10, -10, 120, 120));
    }

    #[test]
    fn test_click_in_frame_is_border_hit() {
        let mut win = window(1, 0, 0, 100, 100, 0.5);
        win.border = Some(Border {
            x: -10,
            y: -10,
            width: 20,
            height: 20,
        });
        let state = state_of(vec![win]);

        // (5, -5) is above the content but inside the frame.
        let hit = hit_test(&state, 5, -5).unwrap();
        assert_eq!(hit.window, 1);
        assert_eq!(hit.kind, HitKind::Border);

        // Inside the content proper.
        let hit = hit_test(&state, 5, 5).unwrap();
        assert_eq!(hit.kind, HitKind::Content);

        // Outside both rectangles.
        assert!(hit_test(&state, 200, 200).is_none());
    }

    #[test]
    fn test_content_wins_over_surrounding_border() {
        // A bordered window behind, a plain window in front; a point
        // inside the front window's content must be a content hit on it
        // no matter what chrome overlaps.
        let mut back = window(1, 0, 0, 300, 300, 0.6);
        back.border = Some(Border {
            x: -5,
            y: -5,
            width: 10,
            height: 10,
        });
        let front = window(2, 50, 50, 100, 100, 0.2);
        let state = state_of(vec![back, front]);

        let hit = hit_test(&state, 60, 60).unwrap();
        assert_eq!(hit.window, 2);
        assert_eq!(hit.kind, HitKind::Content);
    }

    #[test]
    fn test_minimum_depth_wins() {
        let a = window(1, 0, 0, 100, 100, 0.7);
        let b = window(2, 0, 0, 100, 100, 0.3);
        let state = state_of(vec![a, b]);
        assert_eq!(hit_test(&state, 10, 10).unwrap().window, 2);
    }

    #[test]
    fn test_equal_depth_tie_prefers_content() {
        let mut bordered = window(1, 100, 0, 50, 50, 0.4);
        bordered.border = Some(Border {
            x: -100,
            y: 0,
            width: 0,
            height: 0,
        });
        let plain = window(2, 0, 0, 50, 50, 0.4);
        let state = state_of(vec![bordered, plain]);

        // The point is inside plain's content and bordered's chrome band.
        let hit = hit_test(&state, 10, 10).unwrap();
        assert_eq!(hit.window, 2);
        assert_eq!(hit.kind, HitKind::Content);
    }

    #[test]
    fn test_invisible_windows_ignored() {
        let mut win = window(1, 0, 0, 100, 100, 0.5);
        win.visible = false;
        let state = state_of(vec![win]);
        assert!(hit_test(&state, 10, 10).is_none());
    }
}
