//! OpenGL context creation and texture-from-pixmap via GLX.
//!
//! GLX wants an Xlib display, so this module owns a second connection
//! to the server next to the x11rb one; window ids are server-global,
//! which is what lets the two cooperate. The whole texture path (server
//! grab, pixmap naming, GLX pixmap creation, bind/release) stays on the
//! Xlib connection so a grab can never deadlock our own requests.

use anyhow::{Context, Result};
use std::ffi::{c_int, c_ulong, CStr, CString};
use std::ptr;
use tracing::info;
use x11_dl::glx::{self, Glx};
use x11_dl::xcomposite::Xcomposite;
use x11_dl::xlib::{self, Xlib};

use crate::windows::ManagedWindow;

// TFP (Texture From Pixmap) attributes
const GLX_BIND_TO_TEXTURE_RGB_EXT: i32 = 0x20D0;
const GLX_BIND_TO_TEXTURE_RGBA_EXT: i32 = 0x20D1;
const GLX_BIND_TO_TEXTURE_TARGETS_EXT: i32 = 0x20D3;
const GLX_TEXTURE_2D_BIT_EXT: i32 = 0x0002;
const GLX_TEXTURE_FORMAT_EXT: i32 = 0x20D5;
const GLX_TEXTURE_TARGET_EXT: i32 = 0x20D6;
const GLX_MIPMAP_TEXTURE_EXT: i32 = 0x20D7;
const GLX_TEXTURE_FORMAT_RGB_EXT: i32 = 0x20D9;
const GLX_TEXTURE_FORMAT_RGBA_EXT: i32 = 0x20DA;
const GLX_TEXTURE_2D_EXT: i32 = 0x20DC;
const GLX_FRONT_LEFT_EXT: i32 = 0x20DE;

const GLX_CONTEXT_MAJOR_VERSION_ARB: i32 = 0x2091;
const GLX_CONTEXT_MINOR_VERSION_ARB: i32 = 0x2092;

type GlXCreateContextAttribsArb = unsafe extern "C" fn(
    *mut xlib::Display,
    glx::GLXFBConfig,
    glx::GLXContext,
    xlib::Bool,
    *const c_int,
) -> glx::GLXContext;

type GlXBindTexImageExt = unsafe extern "C" fn(*mut xlib::Display, c_ulong, c_int, *const c_int);
type GlXReleaseTexImageExt = unsafe extern "C" fn(*mut xlib::Display, c_ulong, c_int);

/// GLX context on the full-screen output window inside the overlay.
#[allow(non_snake_case)]
pub struct GlContext {
    xlib: Xlib,
    glx: Glx,
    xcomposite: Xcomposite,
    display: *mut xlib::Display,
    screen_num: i32,
    context: glx::GLXContext,
    output_window: c_ulong,

    // Framebuffer configs chosen at init, owned for the process
    // lifetime; per-window configs are found by scanning this array.
    configs: *mut glx::GLXFBConfig,
    config_count: i32,

    glXBindTexImageEXT: GlXBindTexImageExt,
    glXReleaseTexImageEXT: GlXReleaseTexImageExt,
}

impl GlContext {
    /// Open the GL side: output window reparented into the composite
    /// overlay, a GL 3.3 context on it, and the TFP entry points.
    pub fn new(overlay: u32, width: u16, height: u16) -> Result<Self> {
        let xlib = Xlib::open().context("failed to load libX11")?;
        let glx = Glx::open().context("failed to load libGLX")?;
        let xcomposite = Xcomposite::open().context("failed to load libXcomposite")?;

        let display = unsafe { (xlib.XOpenDisplay)(ptr::null()) };
        if display.is_null() {
            anyhow::bail!("failed to open X display for GLX");
        }
        let screen_num = unsafe { (xlib.XDefaultScreen)(display) };
        let root = unsafe { (xlib.XDefaultRootWindow)(display) };

        let mut major = 0;
        let mut minor = 0;
        unsafe {
            (glx.glXQueryVersion)(display, &mut major, &mut minor);
        }
        info!("GLX version {}.{}", major, minor);

        let extensions = unsafe {
            let s = (glx.glXQueryExtensionsString)(display, screen_num);
            if s.is_null() {
                ""
            } else {
                CStr::from_ptr(s).to_str().unwrap_or("")
            }
        };
        if !extensions.contains("GLX_EXT_texture_from_pixmap") {
            unsafe { (xlib.XCloseDisplay)(display) };
            anyhow::bail!("GLX_EXT_texture_from_pixmap not supported");
        }

        // One attribute list serves both the output window and every
        // TFP pixmap; per-window depth matching happens later by
        // scanning the returned array.
        let config_attributes = [
            GLX_BIND_TO_TEXTURE_RGBA_EXT,
            1,
            GLX_BIND_TO_TEXTURE_TARGETS_EXT,
            GLX_TEXTURE_2D_BIT_EXT,
            glx::GLX_RENDER_TYPE as i32,
            glx::GLX_RGBA_BIT as i32,
            glx::GLX_DRAWABLE_TYPE as i32,
            glx::GLX_WINDOW_BIT as i32 | glx::GLX_PIXMAP_BIT as i32,
            glx::GLX_X_VISUAL_TYPE as i32,
            glx::GLX_TRUE_COLOR as i32,
            glx::GLX_X_RENDERABLE as i32,
            1,
            glx::GLX_DOUBLEBUFFER as i32,
            1,
            glx::GLX_RED_SIZE as i32,
            8,
            glx::GLX_GREEN_SIZE as i32,
            8,
            glx::GLX_BLUE_SIZE as i32,
            8,
            glx::GLX_ALPHA_SIZE as i32,
            8,
            glx::GLX_STENCIL_SIZE as i32,
            0,
            glx::GLX_DEPTH_SIZE as i32,
            16,
            0,
        ];

        let mut config_count = 0;
        let configs = unsafe {
            (glx.glXChooseFBConfig)(
                display,
                screen_num,
                config_attributes.as_ptr(),
                &mut config_count,
            )
        };
        if configs.is_null() || config_count == 0 {
            unsafe { (xlib.XCloseDisplay)(display) };
            anyhow::bail!("no suitable GLX framebuffer config (TFP support missing?)");
        }

        // Output window: the visual must come from the config the
        // context is created with.
        let first_config = unsafe { *configs };
        let vinfo = unsafe { (glx.glXGetVisualFromFBConfig)(display, first_config) };
        if vinfo.is_null() {
            unsafe {
                (xlib.XFree)(configs as *mut _);
                (xlib.XCloseDisplay)(display);
            }
            anyhow::bail!("failed to get visual from framebuffer config");
        }

        let output_window = unsafe {
            let colormap =
                (xlib.XCreateColormap)(display, root, (*vinfo).visual, xlib::AllocNone);
            let mut attributes: xlib::XSetWindowAttributes = std::mem::zeroed();
            attributes.border_pixel = 0;
            attributes.colormap = colormap;

            let window = (xlib.XCreateWindow)(
                display,
                root,
                0,
                0,
                width as u32,
                height as u32,
                0,
                (*vinfo).depth,
                xlib::InputOutput as u32,
                (*vinfo).visual,
                xlib::CWBorderPixel | xlib::CWColormap,
                &mut attributes,
            );
            (xlib.XFree)(vinfo as *mut _);

            (xlib.XReparentWindow)(display, window, overlay as c_ulong, 0, 0);
            (xlib.XMapRaised)(display, window);
            (xlib.XSync)(display, 0);
            window
        };

        // glXCreateContextAttribsARB must be loaded by hand.
        let load = |name: &str| unsafe {
            let sym = CString::new(name).unwrap();
            (glx.glXGetProcAddress)(sym.as_ptr() as *const _)
        };

        let create_context_fn = load("glXCreateContextAttribsARB")
            .context("glXCreateContextAttribsARB not available")?;
        let create_context: GlXCreateContextAttribsArb =
            unsafe { std::mem::transmute(create_context_fn) };

        let context_attributes = [
            GLX_CONTEXT_MAJOR_VERSION_ARB,
            3,
            GLX_CONTEXT_MINOR_VERSION_ARB,
            3,
            0,
        ];
        let context = unsafe {
            create_context(
                display,
                first_config,
                ptr::null_mut(),
                1,
                context_attributes.as_ptr(),
            )
        };
        if context.is_null() {
            unsafe {
                (xlib.XFree)(configs as *mut _);
                (xlib.XCloseDisplay)(display);
            }
            anyhow::bail!("glXCreateContextAttribsARB failed");
        }

        let made_current = unsafe { (glx.glXMakeCurrent)(display, output_window, context) };
        if made_current == 0 {
            unsafe {
                (glx.glXDestroyContext)(display, context);
                (xlib.XFree)(configs as *mut _);
                (xlib.XCloseDisplay)(display);
            }
            anyhow::bail!("glXMakeCurrent failed");
        }

        gl::load_with(|symbol| match load(symbol) {
            Some(f) => f as *const _,
            None => ptr::null(),
        });

        let bind_tex = load("glXBindTexImageEXT");
        let release_tex = load("glXReleaseTexImageEXT");
        let (Some(bind_tex), Some(release_tex)) = (bind_tex, release_tex) else {
            unsafe {
                (glx.glXDestroyContext)(display, context);
                (xlib.XFree)(configs as *mut _);
                (xlib.XCloseDisplay)(display);
            }
            anyhow::bail!("GLX_EXT_texture_from_pixmap functions missing");
        };

        info!(
            "GLX context ready, {} TFP-capable framebuffer configs",
            config_count
        );

        Ok(Self {
            xlib,
            glx,
            xcomposite,
            display,
            screen_num,
            context,
            output_window,
            configs,
            config_count,
            glXBindTexImageEXT: unsafe { std::mem::transmute(bind_tex) },
            glXReleaseTexImageEXT: unsafe { std::mem::transmute(release_tex) },
        })
    }

    pub fn output_window(&self) -> u32 {
        self.output_window as u32
    }

    /// Present the frame; blocks on the driver's swap interval, which
    /// is what paces the whole event pump.
    pub fn swap_buffers(&self) {
        unsafe {
            (self.glx.glXSwapBuffers)(self.display, self.output_window);
        }
    }

    /// Scan the init-time config array for one whose visual depth
    /// matches the window's. Returns the config and whether it binds as
    /// RGBA (otherwise RGB).
    fn find_config_for_depth(&self, depth: i32) -> Result<(glx::GLXFBConfig, bool)> {
        for i in 0..self.config_count as usize {
            let config = unsafe { *self.configs.add(i) };
            let vinfo = unsafe { (self.glx.glXGetVisualFromFBConfig)(self.display, config) };
            if vinfo.is_null() {
                continue;
            }
            let visual_depth = unsafe { (*vinfo).depth };
            unsafe { (self.xlib.XFree)(vinfo as *mut _) };
            if visual_depth != depth {
                continue;
            }

            let mut rgba = 0;
            unsafe {
                (self.glx.glXGetFBConfigAttrib)(
                    self.display,
                    config,
                    GLX_BIND_TO_TEXTURE_RGBA_EXT,
                    &mut rgba,
                );
            }
            return Ok((config, rgba != 0));
        }
        anyhow::bail!("no framebuffer config for visual depth {}", depth)
    }

    /// Bind a window's contents to the currently bound GL texture.
    ///
    /// Grabs the server for the duration of the bind (released by
    /// [`GlContext::unbind_window`] after the draw). The composite
    /// pixmap and GLX pixmap are created lazily; a geometry change
    /// releases them so the next bind picks up the resized contents.
    pub fn bind_window(&self, win: &mut ManagedWindow) -> Result<()> {
        unsafe { (self.xlib.XGrabServer)(self.display) };
        match self.bind_locked(win) {
            Ok(()) => Ok(()),
            Err(e) => {
                unsafe {
                    (self.xlib.XUngrabServer)(self.display);
                    (self.xlib.XFlush)(self.display);
                }
                Err(e)
            }
        }
    }

    fn bind_locked(&self, win: &mut ManagedWindow) -> Result<()> {
        if win.glx_pixmap == 0 {
            let mut attributes: xlib::XWindowAttributes = unsafe { std::mem::zeroed() };
            let status = unsafe {
                (self.xlib.XGetWindowAttributes)(self.display, win.id as c_ulong, &mut attributes)
            };
            if status == 0 {
                anyhow::bail!("window {} is gone", win.id);
            }

            let (config, rgba) = self.find_config_for_depth(attributes.depth)?;

            let x_pixmap = unsafe {
                (self.xcomposite.XCompositeNameWindowPixmap)(self.display, win.id as c_ulong)
            };
            if x_pixmap == 0 {
                anyhow::bail!("failed to name composite pixmap for window {}", win.id);
            }

            let format = if rgba {
                GLX_TEXTURE_FORMAT_RGBA_EXT
            } else {
                GLX_TEXTURE_FORMAT_RGB_EXT
            };
            let pixmap_attributes = [
                GLX_TEXTURE_FORMAT_EXT,
                format,
                GLX_TEXTURE_TARGET_EXT,
                GLX_TEXTURE_2D_EXT,
                GLX_MIPMAP_TEXTURE_EXT,
                0,
                0,
            ];
            let glx_pixmap = unsafe {
                (self.glx.glXCreatePixmap)(
                    self.display,
                    config,
                    x_pixmap,
                    pixmap_attributes.as_ptr(),
                )
            };
            if glx_pixmap == 0 {
                unsafe { (self.xlib.XFreePixmap)(self.display, x_pixmap) };
                anyhow::bail!("glXCreatePixmap failed for window {}", win.id);
            }

            win.x_pixmap = x_pixmap as u32;
            win.glx_pixmap = glx_pixmap;
        }

        unsafe {
            (self.glXBindTexImageEXT)(
                self.display,
                win.glx_pixmap,
                GLX_FRONT_LEFT_EXT,
                ptr::null(),
            );
        }
        Ok(())
    }

    /// Release the texture image and the server grab taken by
    /// [`GlContext::bind_window`].
    pub fn unbind_window(&self, win: &ManagedWindow) {
        unsafe {
            if win.glx_pixmap != 0 {
                (self.glXReleaseTexImageEXT)(self.display, win.glx_pixmap, GLX_FRONT_LEFT_EXT);
            }
            (self.xlib.XUngrabServer)(self.display);
            (self.xlib.XFlush)(self.display);
        }
    }

    /// Drop the GPU-side copies of a window. Called on resize (so the
    /// next bind re-creates them) and before the table entry is erased.
    pub fn release_window(&self, win: &mut ManagedWindow) {
        unsafe {
            if win.glx_pixmap != 0 {
                (self.glx.glXDestroyPixmap)(self.display, win.glx_pixmap);
                win.glx_pixmap = 0;
            }
            if win.x_pixmap != 0 {
                (self.xlib.XFreePixmap)(self.display, win.x_pixmap as c_ulong);
                win.x_pixmap = 0;
            }
        }
    }

    #[allow(dead_code)]
    pub fn screen_num(&self) -> i32 {
        self.screen_num
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        unsafe {
            (self.glx.glXMakeCurrent)(self.display, 0, ptr::null_mut());
            (self.glx.glXDestroyContext)(self.display, self.context);
            (self.xlib.XFree)(self.configs as *mut _);
            (self.xlib.XCloseDisplay)(self.display);
        }
    }
}
