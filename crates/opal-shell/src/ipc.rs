//! Shell side of the compositor socket.
//!
//! Lives on the browser host's UI thread; sends are synchronous,
//! receives never block (a query that finds no pending replies returns
//! an empty array to the web view and the next one picks them up).

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;

use anyhow::{Context, Result};
use opal_proto::{socket_path, FrameBuffer, Packet, Segment};
use tracing::{debug, info, warn};

pub struct ShellEndpoint {
    stream: UnixStream,
    frames: FrameBuffer,
}

impl ShellEndpoint {
    /// Connect to the compositor at `/tmp/opal.ipc`.
    pub fn connect() -> Result<Self> {
        let path = socket_path();
        let stream = UnixStream::connect(&path)
            .with_context(|| format!("failed to connect to compositor at {:?}", path))?;
        // Zero receive timeout: the UI thread must never stall on the
        // compositor.
        stream.set_nonblocking(true)?;
        info!("connected to compositor at {:?}", path);

        Ok(Self {
            stream,
            frames: FrameBuffer::new(),
        })
    }

    /// Tell the compositor which X window is the shell's surface. Sent
    /// once, right after the host has created its browser window.
    pub fn announce_base_window(&mut self, window: u32) {
        info!("announcing base window {}", window);
        self.send(&Packet::from(vec![Segment::WindowRequest { window }]));
    }

    /// Register a served file for hot reload.
    pub fn register_file(&mut self, file_path: String) {
        self.send(&Packet::from(vec![Segment::FileRegisterRequest {
            file_path,
        }]));
    }

    /// Send a packet. Failures are logged and swallowed: a dead
    /// compositor means the session is over anyway.
    pub fn send(&mut self, packet: &Packet) {
        let Ok(bytes) = packet.encode() else {
            return;
        };
        if let Err(e) = self.stream.write_all(&bytes) {
            debug!("IPC send failed: {}", e);
        }
    }

    /// Pop the next pending reply packet, if one has fully arrived.
    pub fn try_recv(&mut self) -> Option<Packet> {
        let mut buf = [0u8; 4096];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.frames.extend(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("IPC read failed: {}", e);
                    break;
                }
            }
        }

        match self.frames.next_frame() {
            Ok(Some(body)) => match Packet::decode(&body) {
                Ok(packet) => Some(packet),
                Err(e) => {
                    warn!("dropping undecodable packet: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("IPC stream corrupt: {}", e);
                None
            }
        }
    }
}
