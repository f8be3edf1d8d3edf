//! IPC request dispatch: every segment the shell can send, mapped onto
//! X operations and table updates.

use std::path::Path;
use std::process::Command;

use anyhow::Result;
use opal_proto::Segment;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::*;

use crate::events;
use crate::windows::{Border, BASE_DEPTH};
use crate::Compositor;

pub fn handle_segment(comp: &mut Compositor, segment: Segment) -> Result<()> {
    match segment {
        Segment::WindowRequest { window } => register_base_window(comp, window),

        Segment::WindowMapRequest {
            window,
            x,
            y,
            width,
            height,
        } => {
            comp.display.conn.configure_window(
                window,
                &ConfigureWindowAux::new()
                    .x(x)
                    .y(y)
                    .width(width)
                    .height(height),
            )?;
            Ok(())
        }

        Segment::WindowReorderRequest { windows } => {
            comp.state.apply_reorder(&windows);
            Ok(())
        }

        Segment::WindowFocusRequest { window } => events::focus(comp, window),

        Segment::WindowRegisterBorderRequest {
            window,
            x,
            y,
            width,
            height,
        } => {
            if let Some(win) = comp.state.windows.get_mut(&window) {
                win.border = Some(Border {
                    x,
                    y,
                    width,
                    height,
                });
            }
            Ok(())
        }

        // No side effect of its own; the surrounding iteration renders
        // anyway. Answer with the frame counter for pacing.
        Segment::RenderRequest => {
            comp.outbox.push(Segment::RenderReply {
                last_frame_observed: comp.state.frame,
            });
            Ok(())
        }

        Segment::WindowCloseRequest { window } => {
            comp.display.conn.destroy_window(window)?;
            Ok(())
        }

        Segment::RunProgramRequest { command } => {
            run_program(&command);
            Ok(())
        }

        Segment::FileRegisterRequest { file_path } => {
            if let Err(e) = comp.watcher.register(Path::new(&file_path)) {
                warn!("file_register failed: {}", e);
            }
            Ok(())
        }

        Segment::BrowserStartRequest => {
            resend_windows(comp);
            Ok(())
        }

        // Reply segments have no business arriving here; drop them.
        other => {
            debug!("ignoring unexpected segment: {:?}", other);
            Ok(())
        }
    }
}

/// The shell has announced its window. From here on it is the base:
/// full-screen, stacked below every client, input off (it only ever
/// sees events the compositor forwards).
fn register_base_window(comp: &mut Compositor, window: Window) -> Result<()> {
    info!("registering base window {}", window);
    comp.state.base_window = Some(window);
    if let Some(win) = comp.state.insert(window) {
        win.depth = BASE_DEPTH;
    }

    comp.atoms.clear_input_hint(&comp.display.conn, window)?;
    comp.display.conn.configure_window(
        window,
        &ConfigureWindowAux::new()
            .x(0)
            .y(0)
            .width(comp.display.width as u32)
            .height(comp.display.height as u32)
            .stack_mode(StackMode::BELOW),
    )?;
    Ok(())
}

/// A freshly (re)started shell knows nothing; advertise every managed
/// window so it can rebuild its view. All replies ride one packet.
fn resend_windows(comp: &mut Compositor) {
    info!("shell started, re-advertising {} windows", comp.state.windows.len());
    for (&id, win) in &comp.state.windows {
        if comp.state.base_window == Some(id) {
            continue;
        }
        comp.outbox.push(Segment::WindowMapReply {
            window: id,
            visible: win.visible,
            x: win.geometry.x,
            y: win.geometry.y,
            width: win.geometry.width,
            height: win.geometry.height,
            name: win.name.clone(),
            has_border: Some(win.border.is_some()),
            win_t: Some(win.win_type),
        });
    }
}

/// Spawn a detached child. Exec failure kills only the child; the
/// compositor just logs it.
fn run_program(command: &[String]) {
    let Some((program, args)) = command.split_first() else {
        return;
    };
    info!("spawning {:?}", command);
    match Command::new(program).args(args).env("DISPLAY", ":1").spawn() {
        Ok(_) => {}
        Err(e) => warn!("failed to spawn {}: {}", program, e),
    }
}
