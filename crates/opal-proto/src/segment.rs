//! Packet and segment definitions for the compositor <-> shell protocol.
//!
//! The segment set is closed: both encode and decode are total over the
//! tags below. A decoded segment with an unknown tag is dropped without
//! failing the surrounding packet, so protocol additions on one side do
//! not wedge the other.

use serde::{Deserialize, Serialize};

use crate::encode_frame;

/// EWMH window type, derived from `_NET_WM_WINDOW_TYPE`.
///
/// Serialized with the names the shell's JavaScript expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinType {
    #[serde(rename = "WINDOW_TYPE_DESKTOP")]
    Desktop,
    #[serde(rename = "WINDOW_TYPE_DOCK")]
    Dock,
    #[serde(rename = "WINDOW_TYPE_TOOLBAR")]
    Toolbar,
    #[serde(rename = "WINDOW_TYPE_MENU")]
    Menu,
    #[serde(rename = "WINDOW_TYPE_UTILITY")]
    Utility,
    #[serde(rename = "WINDOW_TYPE_SPLASH")]
    Splash,
    #[serde(rename = "WINDOW_TYPE_DIALOG")]
    Dialog,
    #[serde(rename = "WINDOW_TYPE_DROPDOWN_MENU")]
    DropdownMenu,
    #[serde(rename = "WINDOW_TYPE_POPUP_MENU")]
    PopupMenu,
    #[serde(rename = "WINDOW_TYPE_TOOLTIP")]
    Tooltip,
    #[serde(rename = "WINDOW_TYPE_NOTIFICATION")]
    Notification,
    #[serde(rename = "WINDOW_TYPE_COMBO")]
    Combo,
    #[serde(rename = "WINDOW_TYPE_DND")]
    Dnd,
    #[default]
    #[serde(rename = "WINDOW_TYPE_NORMAL")]
    Normal,
}

/// One tagged protocol segment.
///
/// `*Request` variants travel shell -> compositor, `*Reply` variants
/// compositor -> shell. Window ids are X resource ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Segment {
    // Requests (shell -> compositor)
    /// Designate the shell's own window as the base window.
    WindowRequest { window: u32 },
    /// Move/resize a client window.
    WindowMapRequest {
        window: u32,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    /// Restack managed windows, front of list closest to the viewer.
    WindowReorderRequest { windows: Vec<u32> },
    WindowFocusRequest { window: u32 },
    /// Declare a chrome pass-through border in window-local offsets.
    WindowRegisterBorderRequest {
        window: u32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    /// Frame pacing probe; answered with `RenderReply`.
    RenderRequest,
    WindowCloseRequest { window: u32 },
    RunProgramRequest { command: Vec<String> },
    /// Watch a served file for modifications.
    FileRegisterRequest { file_path: String },
    /// A (re)started shell asks for the full window table.
    BrowserStartRequest,

    // Replies (compositor -> shell)
    WindowFocusReply { window: u32 },
    WindowMapReply {
        window: u32,
        visible: bool,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        has_border: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        win_t: Option<WinType>,
    },
    WindowCloseReply { window: u32 },
    MouseMoveReply { x: i32, y: i32 },
    MousePressReply { state: u32, x: i32, y: i32 },
    RenderReply { last_frame_observed: u64 },
    ReloadReply,
    LogMessageReply { message: String },
    WindowIconReply { window: u32, image: String },
}

/// An ordered sequence of segments; the unit of one IPC send.
///
/// Packets are never nested and may be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    pub segments: Vec<Segment>,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Serialize to a length-prefixed frame ready for the socket.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let body = serde_json::to_vec(&self.segments)?;
        Ok(encode_frame(&body))
    }

    /// Decode a frame body.
    ///
    /// Segments whose tag is not in the closed set are dropped; a body
    /// that is not a JSON array is an error.
    pub fn decode(body: &[u8]) -> anyhow::Result<Self> {
        let raw: Vec<serde_json::Value> = serde_json::from_slice(body)?;
        let segments = raw
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        Ok(Self { segments })
    }
}

impl From<Vec<Segment>> for Packet {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: &Packet) -> Packet {
        let frame = packet.encode().unwrap();
        // Strip the length prefix; FrameBuffer handles that in transit.
        Packet::decode(&frame[4..]).unwrap()
    }

    #[test]
    fn test_roundtrip_window_map_reply() {
        let packet = Packet::from(vec![Segment::WindowMapReply {
            window: 0x1c0000a,
            visible: true,
            x: 100,
            y: 100,
            width: 400,
            height: 300,
            name: Some("Files".into()),
            has_border: Some(false),
            win_t: Some(WinType::Dialog),
        }]);
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_roundtrip_requests_preserve_order() {
        let packet = Packet::from(vec![
            Segment::WindowReorderRequest {
                windows: vec![3, 1, 2],
            },
            Segment::WindowRegisterBorderRequest {
                window: 7,
                x: -10,
                y: -10,
                width: 20,
                height: 20,
            },
            Segment::RunProgramRequest {
                command: vec!["xterm".into(), "-fg".into(), "green".into()],
            },
        ]);
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_unknown_tag_dropped() {
        let body = br#"[{"t":"window_focus_reply","window":5},{"t":"shiny_new_thing","x":1}]"#;
        let packet = Packet::decode(body).unwrap();
        assert_eq!(
            packet.segments,
            vec![Segment::WindowFocusReply { window: 5 }]
        );
    }

    #[test]
    fn test_optional_reply_fields_absent() {
        // A peer that never learned about win_t still decodes.
        let body = br#"[{"t":"window_map_reply","window":9,"visible":false,"x":0,"y":0,"width":1,"height":1}]"#;
        let packet = Packet::decode(body).unwrap();
        match &packet.segments[0] {
            Segment::WindowMapReply { name, win_t, .. } => {
                assert!(name.is_none());
                assert!(win_t.is_none());
            }
            other => panic!("wrong segment: {other:?}"),
        }
    }

    #[test]
    fn test_win_type_wire_names() {
        let json = serde_json::to_string(&WinType::DropdownMenu).unwrap();
        assert_eq!(json, "\"WINDOW_TYPE_DROPDOWN_MENU\"");
        let back: WinType = serde_json::from_str("\"WINDOW_TYPE_NORMAL\"").unwrap();
        assert_eq!(back, WinType::Normal);
    }

    #[test]
    fn test_empty_packet() {
        let packet = Packet::new();
        assert!(packet.is_empty());
        assert_eq!(roundtrip(&packet), packet);
    }
}
