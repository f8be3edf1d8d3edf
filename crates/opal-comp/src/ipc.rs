//! Compositor side of the IPC socket.
//!
//! One shell peer at a time over `/tmp/opal.ipc`. Everything is
//! non-blocking: the event pump polls for a pending connection and
//! drains whatever bytes have arrived, never waiting. A dead peer is
//! dropped silently; the replacement shell announces itself with
//! `browser_start_request` and gets the world re-advertised.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};

use anyhow::{Context, Result};
use opal_proto::{socket_path, FrameBuffer, Packet};
use tracing::{debug, info, warn};

struct Peer {
    stream: UnixStream,
    frames: FrameBuffer,
}

pub struct IpcServer {
    listener: UnixListener,
    peer: Option<Peer>,
}

impl IpcServer {
    pub fn bind() -> Result<Self> {
        let path = socket_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("failed to bind IPC socket {:?}", path))?;
        listener.set_nonblocking(true)?;
        info!("IPC listening on {:?}", path);

        Ok(Self {
            listener,
            peer: None,
        })
    }

    /// Accept a pending shell connection, if any. A new connection
    /// replaces the previous peer.
    pub fn poll_accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(true).is_err() {
                    return;
                }
                info!("shell connected");
                self.peer = Some(Peer {
                    stream,
                    frames: FrameBuffer::new(),
                });
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("IPC accept failed: {}", e),
        }
    }

    /// Drain every packet the peer has sent so far.
    pub fn recv_packets(&mut self) -> Vec<Packet> {
        let Some(peer) = &mut self.peer else {
            return Vec::new();
        };

        let mut packets = Vec::new();
        let mut gone = false;
        let mut buf = [0u8; 4096];

        loop {
            match peer.stream.read(&mut buf) {
                Ok(0) => {
                    gone = true;
                    break;
                }
                Ok(n) => peer.frames.extend(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("IPC read failed: {}", e);
                    gone = true;
                    break;
                }
            }
        }

        loop {
            match peer.frames.next_frame() {
                Ok(Some(body)) => match Packet::decode(&body) {
                    Ok(packet) => packets.push(packet),
                    Err(e) => warn!("dropping undecodable packet: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("IPC stream corrupt: {}", e);
                    gone = true;
                    break;
                }
            }
        }

        if gone {
            info!("shell disconnected");
            self.peer = None;
        }

        packets
    }

    /// Send a packet to the shell. Failures are silent and final for
    /// this peer: recovery is a fresh connection plus
    /// `browser_start_request`, never a retry.
    pub fn send(&mut self, packet: &Packet) {
        let Some(peer) = &mut self.peer else {
            return;
        };
        let Ok(bytes) = packet.encode() else {
            return;
        };
        if let Err(e) = peer.stream.write_all(&bytes) {
            debug!("IPC send failed: {}", e);
            self.peer = None;
        }
    }
}
