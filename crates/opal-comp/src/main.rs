//! Opal compositor: an OpenGL compositing window manager for X11,
//! bridged over a local socket to a web-based shell.
//!
//! Single-threaded cooperative pump. Each iteration drains pending X
//! events, drains pending shell requests, polls the reload watcher,
//! then renders every visible window and presents. Nothing in the loop
//! blocks except the buffer swap, whose vsync is the frame pacing.

mod config;
mod display;
mod events;
mod ewmh;
mod gl_context;
mod hit;
mod ipc;
mod renderer;
mod requests;
mod watch;
mod windows;

use anyhow::{Context, Result};
use opal_proto::Packet;
use std::process::Command;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::connection::Connection;

use config::Config;
use display::Display;
use ewmh::Atoms;
use gl_context::GlContext;
use renderer::Renderer;
use watch::ReloadWatcher;
use windows::{Border, CompositorState, Geometry, BASE_DEPTH};

/// Chrome draws just behind the window it wraps; the offset only has
/// to clear depth-buffer precision, never another window's slot.
const CHROME_DEPTH_OFFSET: f32 = 0.001;

pub struct Compositor {
    pub config: Config,
    pub display: Display,
    pub atoms: Atoms,
    pub gl: GlContext,
    pub renderer: Renderer,
    pub state: CompositorState,
    pub ipc: ipc::IpcServer,
    pub watcher: ReloadWatcher,
    /// Replies accumulated this iteration; flushed as one packet.
    pub outbox: Packet,
}

impl Compositor {
    fn new() -> Result<Self> {
        let config = Config::load()?;

        let display = Display::open()?;
        let atoms = Atoms::new(&display.conn)?;
        display.announce(&atoms)?;

        let gl = GlContext::new(display.overlay, display.width, display.height)
            .context("failed to create GL context")?;
        let renderer = Renderer::new().context("failed to initialize renderer")?;

        let ipc = ipc::IpcServer::bind()?;
        let watcher = ReloadWatcher::new()?;

        let mut state = CompositorState::new();
        state.blacklist.extend([
            display.overlay,
            display.wm_check_window,
            display.selection_owner,
            gl.output_window(),
        ]);

        Ok(Self {
            config,
            display,
            atoms,
            gl,
            renderer,
            state,
            ipc,
            watcher,
            outbox: Packet::new(),
        })
    }

    /// Launch the shell host. Its death is not ours: a restarted shell
    /// reconnects and resyncs over IPC.
    fn spawn_shell(&self) {
        let command = &self.config.shell.command;
        let Some((program, args)) = command.split_first() else {
            warn!("no shell command configured");
            return;
        };
        match Command::new(program).args(args).spawn() {
            Ok(child) => info!("shell host {} started (pid {})", program, child.id()),
            Err(e) => warn!("failed to start shell host {}: {}", program, e),
        }
    }

    fn tick(&mut self) -> Result<()> {
        self.ipc.poll_accept();

        // 1. Every X event that was pending at iteration start.
        while let Some(event) = self.display.conn.poll_for_event()? {
            events::handle_event(self, event)?;
        }

        // 2. Every shell request that was pending.
        for packet in self.ipc.recv_packets() {
            for segment in packet.segments {
                requests::handle_segment(self, segment)?;
            }
        }
        self.display.conn.flush()?;

        // 3. At most one reload signal, however many files changed.
        if self.watcher.poll() {
            self.outbox.push(opal_proto::Segment::ReloadReply);
        }

        if !self.outbox.is_empty() {
            let packet = std::mem::take(&mut self.outbox);
            self.ipc.send(&packet);
        }

        // 4 + 5. Draw the world and present.
        self.render_frame();
        Ok(())
    }

    fn render_frame(&mut self) {
        let screen_w = self.display.width as u32;
        let screen_h = self.display.height as u32;
        self.renderer.viewport(screen_w, screen_h);
        self.renderer.clear(self.config.compositor.clear_color);

        let ids: Vec<u32> = self.state.windows.keys().copied().collect();
        for id in ids {
            let Some(win) = self.state.windows.get(&id) else {
                continue;
            };
            if !win.renderable() || win.vao == 0 {
                continue;
            }
            let geometry = win.geometry;
            let border = win.border;
            let opacity = win.opacity;
            let (vao, index_count) = (win.vao, win.index_count);
            let depth = if self.state.is_base(id) {
                BASE_DEPTH
            } else {
                win.depth
            };
            let depth = depth as f32;

            // Chrome first: the base window's pixels, cropped to the
            // border rectangle, sitting just behind the window itself.
            if let (Some(border), Some(base)) = (border, self.state.base_window) {
                if base != id {
                    self.draw_border_chrome(
                        base,
                        geometry,
                        border,
                        depth + CHROME_DEPTH_OFFSET,
                        vao,
                        index_count,
                        screen_w,
                        screen_h,
                    );
                }
            }

            let Some(win) = self.state.windows.get_mut(&id) else {
                continue;
            };
            self.renderer.bind_texture_target();
            match self.gl.bind_window(win) {
                Ok(()) => {
                    self.renderer.draw_quad(
                        vao,
                        index_count,
                        geometry.x,
                        geometry.y,
                        geometry.width,
                        geometry.height,
                        (0.0, 0.0),
                        (1.0, 1.0),
                        depth,
                        opacity,
                        screen_w,
                        screen_h,
                    );
                    self.gl.unbind_window(win);
                }
                Err(e) => debug!("skipping window {}: {}", id, e),
            }
        }

        self.state.frame += 1;
        self.gl.swap_buffers();
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_border_chrome(
        &mut self,
        base: u32,
        geometry: Geometry,
        border: Border,
        depth: f32,
        vao: u32,
        index_count: i32,
        screen_w: u32,
        screen_h: u32,
    ) {
        let (x0, y0, x1, y1) = hit::border_screen_rect(&geometry, &border);
        let x0 = x0.max(0);
        let y0 = y0.max(0);
        let x1 = x1.min(screen_w as i32);
        let y1 = y1.min(screen_h as i32);
        if x1 <= x0 || y1 <= y0 {
            return;
        }

        let Some(base_win) = self.state.windows.get_mut(&base) else {
            return;
        };
        self.renderer.bind_texture_target();
        match self.gl.bind_window(base_win) {
            Ok(()) => {
                // The base window fills the screen, so screen pixels
                // map one-to-one onto its texture.
                let tex_offset = (x0 as f32 / screen_w as f32, y0 as f32 / screen_h as f32);
                let tex_scale = (
                    (x1 - x0) as f32 / screen_w as f32,
                    (y1 - y0) as f32 / screen_h as f32,
                );
                self.renderer.draw_quad(
                    vao,
                    index_count,
                    x0,
                    y0,
                    (x1 - x0) as u32,
                    (y1 - y0) as u32,
                    tex_offset,
                    tex_scale,
                    depth,
                    1.0,
                    screen_w,
                    screen_h,
                );
                self.gl.unbind_window(base_win);
            }
            Err(e) => debug!("skipping chrome for window: {}", e),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "opal_comp=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting opal compositor");

    let mut comp = Compositor::new()?;
    comp.spawn_shell();

    loop {
        comp.tick()?;
    }
}
