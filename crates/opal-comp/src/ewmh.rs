//! EWMH surface: interned atoms, root properties, window metadata reads.

use anyhow::Result;
use opal_proto::WinType;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::wrapper::ConnectionExt as _;

fn intern<C: Connection>(conn: &C, name: &str) -> Result<Atom> {
    Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
}

/// Holds all interned atoms
#[derive(Debug)]
pub struct Atoms {
    pub net_supported: Atom,
    pub net_client_list: Atom,
    pub net_supporting_wm_check: Atom,
    pub net_wm_name: Atom,
    pub net_wm_window_type: Atom,
    pub wm_name: Atom,
    pub utf8_string: Atom,

    // _NET_WM_WINDOW_TYPE_* values, in the order they map onto WinType.
    win_types: [(Atom, WinType); 14],
}

impl Atoms {
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let win_types = [
            (intern(conn, "_NET_WM_WINDOW_TYPE_DESKTOP")?, WinType::Desktop),
            (intern(conn, "_NET_WM_WINDOW_TYPE_DOCK")?, WinType::Dock),
            (intern(conn, "_NET_WM_WINDOW_TYPE_TOOLBAR")?, WinType::Toolbar),
            (intern(conn, "_NET_WM_WINDOW_TYPE_MENU")?, WinType::Menu),
            (intern(conn, "_NET_WM_WINDOW_TYPE_UTILITY")?, WinType::Utility),
            (intern(conn, "_NET_WM_WINDOW_TYPE_SPLASH")?, WinType::Splash),
            (intern(conn, "_NET_WM_WINDOW_TYPE_DIALOG")?, WinType::Dialog),
            (
                intern(conn, "_NET_WM_WINDOW_TYPE_DROPDOWN_MENU")?,
                WinType::DropdownMenu,
            ),
            (
                intern(conn, "_NET_WM_WINDOW_TYPE_POPUP_MENU")?,
                WinType::PopupMenu,
            ),
            (intern(conn, "_NET_WM_WINDOW_TYPE_TOOLTIP")?, WinType::Tooltip),
            (
                intern(conn, "_NET_WM_WINDOW_TYPE_NOTIFICATION")?,
                WinType::Notification,
            ),
            (intern(conn, "_NET_WM_WINDOW_TYPE_COMBO")?, WinType::Combo),
            (intern(conn, "_NET_WM_WINDOW_TYPE_DND")?, WinType::Dnd),
            (intern(conn, "_NET_WM_WINDOW_TYPE_NORMAL")?, WinType::Normal),
        ];

        Ok(Self {
            net_supported: intern(conn, "_NET_SUPPORTED")?,
            net_client_list: intern(conn, "_NET_CLIENT_LIST")?,
            net_supporting_wm_check: intern(conn, "_NET_SUPPORTING_WM_CHECK")?,
            net_wm_name: intern(conn, "_NET_WM_NAME")?,
            net_wm_window_type: intern(conn, "_NET_WM_WINDOW_TYPE")?,
            wm_name: intern(conn, "WM_NAME")?,
            utf8_string: intern(conn, "UTF8_STRING")?,
            win_types,
        })
    }

    /// Advertise what we support on the root window.
    pub fn set_supported<C: Connection>(&self, conn: &C, root: Window) -> Result<()> {
        let supported = [
            self.net_supported,
            self.net_client_list,
            self.net_supporting_wm_check,
            self.net_wm_name,
            self.net_wm_window_type,
        ];
        conn.change_property32(PropMode::REPLACE, root, self.net_supported, AtomEnum::ATOM, &supported)?;
        Ok(())
    }

    /// Point `_NET_SUPPORTING_WM_CHECK` on root and check window at the
    /// check window, and name it.
    pub fn set_wm_check<C: Connection>(
        &self,
        conn: &C,
        root: Window,
        check: Window,
        name: &str,
    ) -> Result<()> {
        let prop = self.net_supporting_wm_check;
        conn.change_property32(PropMode::REPLACE, root, prop, AtomEnum::WINDOW, &[check])?;
        conn.change_property32(PropMode::REPLACE, check, prop, AtomEnum::WINDOW, &[check])?;
        conn.change_property8(PropMode::REPLACE, check, self.net_wm_name, self.utf8_string, name.as_bytes())?;
        Ok(())
    }

    pub fn set_client_list<C: Connection>(&self, conn: &C, root: Window, ids: &[u32]) -> Result<()> {
        conn.change_property32(PropMode::REPLACE, root, self.net_client_list, AtomEnum::WINDOW, ids)?;
        Ok(())
    }

    /// Clear the ICCCM input hint so the X server never offers the
    /// window keyboard focus on its own. The base window only ever
    /// receives input the compositor forwards to it.
    pub fn clear_input_hint<C: Connection>(&self, conn: &C, window: Window) -> Result<()> {
        // WM_HINTS: flags, input, initial_state, icon_pixmap, icon_window,
        // icon_x, icon_y, icon_mask, window_group. Bit 0 of flags is
        // InputHint; input itself is 0 (False).
        let hints = [1u32, 0, 0, 0, 0, 0, 0, 0, 0];
        conn.change_property32(PropMode::REPLACE, window, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, &hints)?;
        Ok(())
    }

    /// Window title: `_NET_WM_NAME` when set, `WM_NAME` as fallback.
    pub fn window_title<C: Connection>(&self, conn: &C, window: Window) -> Option<String> {
        let lookups = [
            (self.net_wm_name, self.utf8_string),
            (self.wm_name, AtomEnum::STRING.into()),
        ];
        for (property, ty) in lookups {
            let Ok(cookie) = conn.get_property(false, window, property, ty, 0, 1024) else {
                continue;
            };
            if let Ok(reply) = cookie.reply() {
                if !reply.value.is_empty() {
                    return Some(String::from_utf8_lossy(&reply.value).to_string());
                }
            }
        }
        None
    }

    /// Derive the EWMH window type from `_NET_WM_WINDOW_TYPE`.
    ///
    /// The property is a list of atoms in preference order; the first
    /// one we recognize wins. Absent or unknown types are `Normal`.
    pub fn window_type<C: Connection>(&self, conn: &C, window: Window) -> WinType {
        let reply = conn
            .get_property(false, window, self.net_wm_window_type, AtomEnum::ATOM, 0, 32)
            .ok()
            .and_then(|cookie| cookie.reply().ok());
        let Some(reply) = reply else {
            return WinType::Normal;
        };
        let Some(atoms) = reply.value32() else {
            return WinType::Normal;
        };

        for atom in atoms {
            for &(known, ty) in &self.win_types {
                if atom == known {
                    return ty;
                }
            }
        }
        WinType::Normal
    }
}
