//! X event handling.
//!
//! The pump drains these to quiescence before touching IPC, so the
//! window table always reflects every X event that was pending at the
//! start of an iteration. Replies for the shell accumulate in the
//! compositor's outbox and leave as one packet per iteration.

use anyhow::Result;
use opal_proto::Segment;
use tracing::{debug, error};
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::x11_utils::X11Error;

use crate::hit::{self, HitKind};
use crate::windows::{Geometry, BASE_DEPTH};
use crate::Compositor;

pub fn handle_event(comp: &mut Compositor, event: Event) -> Result<()> {
    match event {
        Event::CreateNotify(e) => on_create(comp, e.window),
        Event::ConfigureNotify(e) => on_geometry_change(comp, e.window),
        Event::MapNotify(e) => on_geometry_change(comp, e.window),
        Event::UnmapNotify(e) => on_geometry_change(comp, e.window),
        Event::DestroyNotify(e) => on_destroy(comp, e.window),
        Event::ButtonPress(e) => on_button(comp, &e, true),
        Event::ButtonRelease(e) => on_button(comp, &e, false),
        // Plain motion is dropped: the base window gets its motion via
        // the raw-motion forward below, everyone else from the server.
        Event::MotionNotify(_) => Ok(()),
        Event::XinputRawMotion(_) => on_raw_motion(comp),
        Event::Error(e) => {
            on_error(comp, &e);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn on_create(comp: &mut Compositor, window: Window) -> Result<()> {
    if comp.state.blacklist.contains(&window) || comp.state.windows.contains_key(&window) {
        return Ok(());
    }
    debug!("CreateNotify: window {}", window);

    let mesh = comp.renderer.create_mesh();
    if let Some(win) = comp.state.insert(window) {
        win.vao = mesh.vao;
        win.vbo = mesh.vbo;
        win.ibo = mesh.ibo;
        win.index_count = mesh.index_count;
    }

    // Focus events from the window itself; buttons grabbed with sync
    // modes so a press freezes the pointer until hit testing decides
    // whether to forward or replay it.
    comp.display.conn.change_window_attributes(
        window,
        &ChangeWindowAttributesAux::new().event_mask(EventMask::FOCUS_CHANGE),
    )?;
    comp.display.conn.grab_button(
        true,
        window,
        EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::BUTTON_MOTION,
        GrabMode::SYNC,
        GrabMode::SYNC,
        x11rb::NONE,
        x11rb::NONE,
        ButtonIndex::ANY,
        ModMask::ANY,
    )?;

    let ids = comp.state.client_ids();
    comp.atoms
        .set_client_list(&comp.display.conn, comp.display.root, &ids)?;
    lower_base(comp)?;
    Ok(())
}

/// Shared path for ConfigureNotify, MapNotify and UnmapNotify: the
/// event only tells us something changed; the truth comes from a fresh
/// attribute and geometry query.
fn on_geometry_change(comp: &mut Compositor, window: Window) -> Result<()> {
    if comp.state.blacklist.contains(&window) {
        return Ok(());
    }
    let Some(was_visible) = comp.state.windows.get(&window).map(|w| w.visible) else {
        return Ok(());
    };

    let attributes = comp.display.conn.get_window_attributes(window)?.reply();
    let geom = comp.display.conn.get_geometry(window)?.reply();
    let (Ok(attributes), Ok(geom)) = (attributes, geom) else {
        // The window raced away between the event and our query;
        // DestroyNotify will clean up.
        return Ok(());
    };

    let visible = attributes.map_state == MapState::VIEWABLE;
    let mut geometry = Geometry {
        x: geom.x as i32,
        y: geom.y as i32,
        width: geom.width as u32,
        height: geom.height as u32,
    };

    // A window appearing for the first time at the origin gets centered
    // on the pointer instead of piling up in the corner.
    if visible && !was_visible && geometry.x == 0 && geometry.y == 0 {
        if let Ok(pointer) = comp.display.conn.query_pointer(comp.display.root)?.reply() {
            geometry.x = pointer.root_x as i32 - geometry.width as i32 / 2;
            geometry.y = pointer.root_y as i32 - geometry.height as i32 / 2;
            comp.display.conn.configure_window(
                window,
                &ConfigureWindowAux::new().x(geometry.x).y(geometry.y),
            )?;
        }
    }

    let name = comp.atoms.window_title(&comp.display.conn, window);
    let win_type = comp.atoms.window_type(&comp.display.conn, window);

    let Some(win) = comp.state.windows.get_mut(&window) else {
        return Ok(());
    };
    win.visible = visible;
    win.geometry = geometry;
    win.name = name.clone();
    win.win_type = win_type;

    // The contents pixmap is tied to the old size; drop it so the next
    // texture bind names a fresh one.
    comp.gl.release_window(win);
    let has_border = win.border.is_some();

    if !comp.state.is_base(window) {
        comp.outbox.push(Segment::WindowMapReply {
            window,
            visible,
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            name,
            has_border: Some(has_border),
            win_t: Some(win_type),
        });
    }

    lower_base(comp)?;
    Ok(())
}

fn on_destroy(comp: &mut Compositor, window: Window) -> Result<()> {
    let was_base = comp.state.is_base(window);
    let Some(mut win) = comp.state.remove(window) else {
        return Ok(());
    };
    debug!("DestroyNotify: window {}", window);

    comp.gl.release_window(&mut win);
    if win.vao != 0 {
        comp.renderer.destroy_mesh(win.vao, win.vbo, win.ibo);
    }

    if !was_base && window != 0 {
        comp.outbox.push(Segment::WindowCloseReply { window });
    }

    let ids = comp.state.client_ids();
    comp.atoms
        .set_client_list(&comp.display.conn, comp.display.root, &ids)?;
    Ok(())
}

fn on_button(comp: &mut Compositor, event: &ButtonPressEvent, is_press: bool) -> Result<()> {
    let x = event.root_x as i32;
    let y = event.root_y as i32;
    let hit = hit::hit_test(&comp.state, x, y);

    let mut forwarded = false;
    if let (Some(hit), Some(base)) = (hit, comp.state.base_window) {
        if hit.kind == HitKind::Border && hit.window != base {
            forward_button(comp, base, event, is_press)?;
            if is_press {
                comp.outbox.push(Segment::MousePressReply {
                    state: u32::from(u16::from(event.state)),
                    x,
                    y,
                });
            }
            forwarded = true;
        }
    }

    // The sync grab froze the pointer at the press; a forwarded click
    // belongs to the shell chrome, anything else goes back to the
    // client untouched.
    let mode = if forwarded {
        Allow::SYNC_POINTER
    } else {
        Allow::REPLAY_POINTER
    };
    comp.display.conn.allow_events(mode, x11rb::CURRENT_TIME)?;

    if is_press && !forwarded {
        if let Some(hit) = hit {
            if hit.kind == HitKind::Content {
                focus(comp, hit.window)?;
            }
        }
    }
    Ok(())
}

fn forward_button(
    comp: &mut Compositor,
    base: Window,
    event: &ButtonPressEvent,
    is_press: bool,
) -> Result<()> {
    let response_type = if is_press {
        BUTTON_PRESS_EVENT
    } else {
        BUTTON_RELEASE_EVENT
    };
    // The base window fills the screen at the origin, so root
    // coordinates are its local coordinates.
    let synthesized = ButtonPressEvent {
        response_type,
        detail: event.detail,
        sequence: 0,
        time: event.time,
        root: comp.display.root,
        event: base,
        child: x11rb::NONE,
        root_x: event.root_x,
        root_y: event.root_y,
        event_x: event.root_x,
        event_y: event.root_y,
        state: event.state,
        same_screen: true,
    };
    comp.display
        .conn
        .send_event(false, base, EventMask::NO_EVENT, synthesized)?;
    Ok(())
}

fn on_raw_motion(comp: &mut Compositor) -> Result<()> {
    let Some(base) = comp.state.base_window else {
        return Ok(());
    };
    // Raw events carry device deltas; what the shell wants is the
    // cursor, so ask the server where it actually is.
    let pointer = comp.display.conn.query_pointer(comp.display.root)?.reply()?;

    let synthesized = MotionNotifyEvent {
        response_type: MOTION_NOTIFY_EVENT,
        detail: Motion::NORMAL,
        sequence: 0,
        time: x11rb::CURRENT_TIME,
        root: comp.display.root,
        event: base,
        child: x11rb::NONE,
        root_x: pointer.root_x,
        root_y: pointer.root_y,
        event_x: pointer.root_x,
        event_y: pointer.root_y,
        state: pointer.mask,
        same_screen: true,
    };
    comp.display
        .conn
        .send_event(false, base, EventMask::NO_EVENT, synthesized)?;

    comp.outbox.push(Segment::MouseMoveReply {
        x: pointer.root_x as i32,
        y: pointer.root_y as i32,
    });
    Ok(())
}

fn on_error(comp: &mut Compositor, e: &X11Error) {
    // Errors against resource 0 are stale requests for windows that
    // vanished mid-flight; they carry no information.
    if e.bad_value == 0 {
        return;
    }
    let message = format!(
        "X error: {:?} (code {}, opcode {}:{}), resource 0x{:x}",
        e.error_kind, e.error_code, e.major_opcode, e.minor_opcode, e.bad_value
    );
    error!("{}", message);
    comp.outbox.push(Segment::LogMessageReply { message });
}

/// Accept a focus change onto a managed, non-base window: real input
/// focus, map-raise, bookkeeping, and a reply so the shell can track
/// the active window.
pub fn focus(comp: &mut Compositor, window: Window) -> Result<()> {
    if comp.state.is_base(window) || !comp.state.windows.contains_key(&window) {
        return Ok(());
    }
    comp.display
        .conn
        .set_input_focus(InputFocus::PARENT, window, x11rb::CURRENT_TIME)?;
    comp.display.conn.map_window(window)?;
    comp.display.conn.configure_window(
        window,
        &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
    )?;
    comp.state.focused = Some(window);
    comp.outbox.push(Segment::WindowFocusReply { window });
    Ok(())
}

/// The base window lives behind everything; any restack that might
/// have lifted it gets undone here.
pub fn lower_base(comp: &mut Compositor) -> Result<()> {
    if let Some(base) = comp.state.base_window {
        comp.display.conn.configure_window(
            base,
            &ConfigureWindowAux::new().stack_mode(StackMode::BELOW),
        )?;
        if let Some(win) = comp.state.windows.get_mut(&base) {
            win.depth = BASE_DEPTH;
        }
    }
    Ok(())
}
