//! JSON envelope between the web shell and the wire protocol.
//!
//! The shell's JavaScript sends a JSON array of objects, each with a
//! `"t"` discriminator naming a request tag without its `_request`
//! suffix. Window ids cross this boundary as decimal strings (a JS
//! number would lose precision past 53 bits); geometry stays numeric.
//! Replies come back the same way: an array of `"t"`-tagged objects.
//!
//! Unknown `"t"` values are dropped without error in both directions; a
//! malformed field fails the whole query back to the caller with code
//! `-1` and the error text.

use anyhow::{Context, Result};
use opal_proto::{Packet, Segment};
use serde_json::{json, Value};

use crate::ipc::ShellEndpoint;

/// A failed query, surfaced to the web view as (code, message).
#[derive(Debug)]
pub struct BridgeError {
    pub code: i32,
    pub message: String,
}

/// Handle one native query from the web view: parse, send, collect
/// replies, answer.
pub fn handle_query(endpoint: &mut ShellEndpoint, request: &str) -> Result<String, BridgeError> {
    let packet = parse_request(request).map_err(|e| BridgeError {
        code: -1,
        message: format!("{e:#}"),
    })?;

    if !packet.is_empty() {
        endpoint.send(&packet);
    }

    let replies = endpoint.try_recv().unwrap_or_default();
    Ok(replies_to_json(&replies).to_string())
}

fn window_id(obj: &Value) -> Result<u32> {
    let id = obj
        .get("window")
        .and_then(Value::as_str)
        .context("window id must be a decimal string")?;
    id.parse()
        .with_context(|| format!("bad window id {:?}", id))
}

fn int_field(obj: &Value, key: &str) -> Result<i32> {
    let n = obj
        .get(key)
        .and_then(Value::as_i64)
        .with_context(|| format!("missing numeric field {:?}", key))?;
    Ok(n as i32)
}

fn uint_field(obj: &Value, key: &str) -> Result<u32> {
    let n = obj
        .get(key)
        .and_then(Value::as_u64)
        .with_context(|| format!("missing numeric field {:?}", key))?;
    Ok(n as u32)
}

fn string_list(obj: &Value, key: &str) -> Result<Vec<String>> {
    let list = obj
        .get(key)
        .and_then(Value::as_array)
        .with_context(|| format!("missing array field {:?}", key))?;
    list.iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .with_context(|| format!("{:?} entries must be strings", key))
        })
        .collect()
}

/// Translate the shell's JSON array into a packet of request segments.
pub fn parse_request(request: &str) -> Result<Packet> {
    let array: Vec<Value> = serde_json::from_str(request).context("query is not a JSON array")?;

    let mut packet = Packet::new();
    for obj in &array {
        let Some(tag) = obj.get("t").and_then(Value::as_str) else {
            continue;
        };
        match tag {
            "window" => packet.push(Segment::WindowRequest {
                window: window_id(obj)?,
            }),
            "window_map" => packet.push(Segment::WindowMapRequest {
                window: window_id(obj)?,
                x: int_field(obj, "x")?,
                y: int_field(obj, "y")?,
                width: uint_field(obj, "width")?,
                height: uint_field(obj, "height")?,
            }),
            "window_reorder" => {
                let windows = string_list(obj, "windows")?
                    .iter()
                    .map(|id| id.parse().with_context(|| format!("bad window id {:?}", id)))
                    .collect::<Result<Vec<u32>>>()?;
                packet.push(Segment::WindowReorderRequest { windows });
            }
            "window_focus" => packet.push(Segment::WindowFocusRequest {
                window: window_id(obj)?,
            }),
            "window_register_border" => packet.push(Segment::WindowRegisterBorderRequest {
                window: window_id(obj)?,
                x: int_field(obj, "x")?,
                y: int_field(obj, "y")?,
                width: int_field(obj, "width")?,
                height: int_field(obj, "height")?,
            }),
            "render" => packet.push(Segment::RenderRequest),
            "window_close" => packet.push(Segment::WindowCloseRequest {
                window: window_id(obj)?,
            }),
            "run_program" => packet.push(Segment::RunProgramRequest {
                command: string_list(obj, "command")?,
            }),
            "file_register" => packet.push(Segment::FileRegisterRequest {
                file_path: obj
                    .get("file_path")
                    .and_then(Value::as_str)
                    .context("missing field \"file_path\"")?
                    .to_owned(),
            }),
            "browser_start" => packet.push(Segment::BrowserStartRequest),
            // Unknown discriminators are dropped, not errors.
            _ => {}
        }
    }
    Ok(packet)
}

/// Re-encode request segments as envelope JSON (the inverse of
/// [`parse_request`]).
pub fn requests_to_json(packet: &Packet) -> Value {
    let mut array = Vec::new();
    for segment in &packet.segments {
        let obj = match segment {
            Segment::WindowRequest { window } => json!({
                "t": "window",
                "window": window.to_string(),
            }),
            Segment::WindowMapRequest {
                window,
                x,
                y,
                width,
                height,
            } => json!({
                "t": "window_map",
                "window": window.to_string(),
                "x": x, "y": y, "width": width, "height": height,
            }),
            Segment::WindowReorderRequest { windows } => json!({
                "t": "window_reorder",
                "windows": windows.iter().map(u32::to_string).collect::<Vec<_>>(),
            }),
            Segment::WindowFocusRequest { window } => json!({
                "t": "window_focus",
                "window": window.to_string(),
            }),
            Segment::WindowRegisterBorderRequest {
                window,
                x,
                y,
                width,
                height,
            } => json!({
                "t": "window_register_border",
                "window": window.to_string(),
                "x": x, "y": y, "width": width, "height": height,
            }),
            Segment::RenderRequest => json!({ "t": "render" }),
            Segment::WindowCloseRequest { window } => json!({
                "t": "window_close",
                "window": window.to_string(),
            }),
            Segment::RunProgramRequest { command } => json!({
                "t": "run_program",
                "command": command,
            }),
            Segment::FileRegisterRequest { file_path } => json!({
                "t": "file_register",
                "file_path": file_path,
            }),
            Segment::BrowserStartRequest => json!({ "t": "browser_start" }),
            // Replies never travel shell -> compositor.
            _ => continue,
        };
        array.push(obj);
    }
    Value::Array(array)
}

/// Translate a reply packet into the JSON array handed back to the web
/// view.
pub fn replies_to_json(packet: &Packet) -> Value {
    let mut array = Vec::new();
    for segment in &packet.segments {
        let obj = match segment {
            Segment::WindowFocusReply { window } => json!({
                "t": "window_focus",
                "window": window.to_string(),
            }),
            Segment::WindowMapReply {
                window,
                visible,
                x,
                y,
                width,
                height,
                name,
                has_border,
                win_t,
            } => json!({
                "t": "window_map",
                "window": window.to_string(),
                "visible": visible,
                "x": x, "y": y, "width": width, "height": height,
                "name": name.clone().unwrap_or_default(),
                "has_border": has_border.unwrap_or(false),
                "win_t": win_t.unwrap_or_default(),
            }),
            Segment::WindowCloseReply { window } => json!({
                "t": "window_close",
                "window": window.to_string(),
            }),
            Segment::MouseMoveReply { x, y } => json!({
                "t": "mouse_move",
                "x": x, "y": y,
            }),
            Segment::MousePressReply { state, x, y } => json!({
                "t": "mouse_press",
                "state": state, "x": x, "y": y,
            }),
            Segment::RenderReply {
                last_frame_observed,
            } => json!({
                "t": "render_reply",
                "last_frame_observed": last_frame_observed,
            }),
            Segment::ReloadReply => json!({ "t": "reload" }),
            Segment::LogMessageReply { message } => json!({
                "t": "log",
                "message": message,
            }),
            Segment::WindowIconReply { window, image } => json!({
                "t": "window_icon",
                "window": window.to_string(),
                "image": image,
            }),
            // Requests never travel compositor -> shell.
            _ => continue,
        };
        array.push(obj);
    }
    Value::Array(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_proto::WinType;

    #[test]
    fn test_request_roundtrip_preserves_tags_and_ids() {
        // Ids chosen past 2^24 so string transport actually matters.
        let query = r#"[
            {"t":"window_map","window":"29360131","x":10,"y":20,"width":400,"height":300},
            {"t":"window_reorder","windows":["29360131","29360132"]},
            {"t":"render"},
            {"t":"run_program","command":["xterm","-e","htop"]},
            {"t":"browser_start"}
        ]"#;
        let packet = parse_request(query).unwrap();
        assert_eq!(packet.segments.len(), 5);

        let reencoded = requests_to_json(&packet);
        let original: Vec<Value> = serde_json::from_str(query).unwrap();
        assert_eq!(reencoded, Value::Array(original));
    }

    #[test]
    fn test_unknown_tag_dropped_silently() {
        let query = r#"[{"t":"teleport_window","window":"5"},{"t":"render"}]"#;
        let packet = parse_request(query).unwrap();
        assert_eq!(packet.segments, vec![Segment::RenderRequest]);
    }

    #[test]
    fn test_missing_discriminator_skipped() {
        let packet = parse_request(r#"[{"window":"5"}]"#).unwrap();
        assert!(packet.is_empty());
    }

    #[test]
    fn test_bad_field_fails_query() {
        // Numeric window id instead of a string: the whole query errors.
        let err = parse_request(r#"[{"t":"window_focus","window":42}]"#).unwrap_err();
        assert!(err.to_string().contains("window id"));
    }

    #[test]
    fn test_not_an_array_fails_query() {
        assert!(parse_request(r#"{"t":"render"}"#).is_err());
    }

    #[test]
    fn test_reply_translation() {
        let packet = Packet::from(vec![
            Segment::WindowMapReply {
                window: 77,
                visible: true,
                x: 1,
                y: 2,
                width: 3,
                height: 4,
                name: Some("Editor".into()),
                has_border: Some(true),
                win_t: Some(WinType::Dialog),
            },
            Segment::ReloadReply,
            Segment::MousePressReply { state: 256, x: 5, y: -5 },
        ]);
        let json = replies_to_json(&packet);
        let array = json.as_array().unwrap();
        assert_eq!(array.len(), 3);

        assert_eq!(array[0]["t"], "window_map");
        assert_eq!(array[0]["window"], "77");
        assert_eq!(array[0]["name"], "Editor");
        assert_eq!(array[0]["win_t"], "WINDOW_TYPE_DIALOG");
        assert_eq!(array[1]["t"], "reload");
        assert_eq!(array[2]["t"], "mouse_press");
        assert_eq!(array[2]["state"], 256);
    }

    #[test]
    fn test_reply_defaults_when_fields_absent() {
        let packet = Packet::from(vec![Segment::WindowMapReply {
            window: 1,
            visible: false,
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            name: None,
            has_border: None,
            win_t: None,
        }]);
        let json = replies_to_json(&packet);
        assert_eq!(json[0]["name"], "");
        assert_eq!(json[0]["has_border"], false);
        assert_eq!(json[0]["win_t"], "WINDOW_TYPE_NORMAL");
    }
}
