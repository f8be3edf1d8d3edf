//! X server integration: connection, composite redirection, overlay
//! plumbing and the EWMH announcement windows.
//!
//! Everything here runs once at startup. Failure of any step is fatal;
//! a compositor without redirection or without XInput2 cannot do its
//! job.

use anyhow::{Context, Result};
use tracing::info;
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::composite::{self, ConnectionExt as _, Redirect};
use x11rb::protocol::shape;
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::ewmh::Atoms;

/// The compositor's X-side world, opened once and owned for the
/// process lifetime.
pub struct Display {
    pub conn: RustConnection,
    pub screen_num: usize,
    pub root: Window,
    pub width: u16,
    pub height: u16,
    /// Composite overlay window; all drawing ends up inside it.
    pub overlay: Window,
    /// 1x1 window backing `_NET_SUPPORTING_WM_CHECK`.
    pub wm_check_window: Window,
    /// Owner of the `_NET_WM_CM_S<screen>` selection.
    pub selection_owner: Window,
}

impl Display {
    pub fn open() -> Result<Self> {
        let (conn, screen_num) =
            RustConnection::connect(None).context("failed to connect to X server")?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let width = screen.width_in_pixels;
        let height = screen.height_in_pixels;

        info!("connected to X server, screen {} ({}x{})", screen_num, width, height);

        // We watch, we never redirect structure: clients map themselves,
        // the compositor only mirrors what happened.
        let mask = EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::POINTER_MOTION
            | EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE;
        conn.change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .check()
            .context("failed to select events on the root window")?;

        conn.extension_information(composite::X11_EXTENSION_NAME)?
            .context("Composite extension not available")?;
        let composite_version = conn
            .composite_query_version(0, 4)?
            .reply()
            .context("failed to query Composite version")?;
        info!(
            "Composite extension {}.{}",
            composite_version.major_version, composite_version.minor_version
        );

        conn.extension_information(xfixes::X11_EXTENSION_NAME)?
            .context("XFixes extension not available")?;
        conn.xfixes_query_version(5, 0)?
            .reply()
            .context("failed to query XFixes version")?;

        let xi_version = conn
            .xinput_xi_query_version(2, 0)?
            .reply()
            .context("XInput2 not available")?;
        info!(
            "XInput {}.{}",
            xi_version.major_version, xi_version.minor_version
        );

        // Raw motion from every master pointer, regardless of which
        // window currently owns the cursor.
        conn.xinput_xi_select_events(
            root,
            &[xinput::EventMask {
                deviceid: u16::from(xinput::Device::ALL_MASTER),
                mask: vec![xinput::XIEventMask::RAW_MOTION],
            }],
        )?;

        // Send every client window off-screen; we composite them back.
        conn.composite_redirect_subwindows(root, Redirect::MANUAL)?;
        let overlay = conn.composite_get_overlay_window(root)?.reply()?.overlay_win;
        info!("composite overlay window: {}", overlay);

        // Empty input shape so clicks pass through the overlay to the
        // windows underneath.
        let region = conn.generate_id()?;
        conn.xfixes_create_region(region, &[])?;
        conn.xfixes_set_window_shape_region(overlay, shape::SK::INPUT, 0, 0, region)?;
        conn.xfixes_destroy_region(region)?;

        let wm_check_window = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            wm_check_window,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            0,
            &CreateWindowAux::new(),
        )?;

        let selection_owner = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            selection_owner,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            0,
            &CreateWindowAux::new(),
        )?;

        // Claim the composite-manager selection for this screen.
        let selection_name = format!("_NET_WM_CM_S{}", screen_num);
        let selection = conn
            .intern_atom(false, selection_name.as_bytes())?
            .reply()?
            .atom;
        conn.set_selection_owner(selection_owner, selection, x11rb::CURRENT_TIME)?;
        info!("owning {}", selection_name);

        conn.flush()?;

        Ok(Self {
            conn,
            screen_num,
            root,
            width,
            height,
            overlay,
            wm_check_window,
            selection_owner,
        })
    }

    /// Publish the EWMH properties that advertise us as the running
    /// window manager.
    pub fn announce(&self, atoms: &Atoms) -> Result<()> {
        atoms.set_supported(&self.conn, self.root)?;
        atoms.set_wm_check(&self.conn, self.root, self.wm_check_window, "opal")?;
        atoms.set_client_list(&self.conn, self.root, &[])?;
        self.conn.flush()?;
        Ok(())
    }
}
