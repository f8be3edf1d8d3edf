//! OpenGL rendering backend: one depth-tested quad per draw, textured
//! straight from the window's GLX pixmap.

use anyhow::Result;
use std::ffi::CString;
use std::ptr;
use tracing::{info, warn};

/// GPU mesh for a full-window quad. Created once per managed window.
pub struct QuadMesh {
    pub vao: u32,
    pub vbo: u32,
    pub ibo: u32,
    pub index_count: i32,
}

/// Compositing renderer.
///
/// A single texture object serves every draw: the caller binds it,
/// attaches a GLX pixmap with texture-from-pixmap, draws, releases.
pub struct Renderer {
    program: u32,
    texture: u32,

    u_position: i32,
    u_size: i32,
    u_depth: i32,
    u_opacity: i32,
    u_tex_offset: i32,
    u_tex_scale: i32,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        unsafe {
            // Depth testing gives us the window ordering; blending the
            // per-window opacity.
            gl::Enable(gl::DEPTH_TEST);
            gl::DepthFunc(gl::LESS);
            gl::Enable(gl::BLEND);
            gl::BlendFunc(gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA);

            let program = Self::build_program()?;
            gl::UseProgram(program);

            let locate = |name: &[u8]| unsafe {
                gl::GetUniformLocation(program, name.as_ptr() as *const _)
            };
            let u_position = locate(b"uPosition\0");
            let u_size = locate(b"uSize\0");
            let u_depth = locate(b"uDepth\0");
            let u_opacity = locate(b"uOpacity\0");
            let u_tex_offset = locate(b"uTexOffset\0");
            let u_tex_scale = locate(b"uTexScale\0");
            gl::Uniform1i(locate(b"uTexture\0"), 0);

            let mut texture = 0;
            gl::GenTextures(1, &mut texture);
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
            gl::BindTexture(gl::TEXTURE_2D, 0);

            info!("OpenGL renderer initialized");

            Ok(Self {
                program,
                texture,
                u_position,
                u_size,
                u_depth,
                u_opacity,
                u_tex_offset,
                u_tex_scale,
            })
        }
    }

    fn build_program() -> Result<u32> {
        let vertex_shader = r#"
            #version 330 core
            layout (location = 0) in vec2 aPos;

            uniform vec2 uPosition;
            uniform vec2 uSize;
            uniform float uDepth;
            uniform vec2 uTexOffset;
            uniform vec2 uTexScale;

            out vec2 TexCoord;

            void main() {
                vec2 pos = aPos * uSize + uPosition;
                gl_Position = vec4(pos, uDepth, 1.0);
                // Pixmap rows start at the top; quad positions at the bottom.
                TexCoord = uTexOffset + vec2(aPos.x, 1.0 - aPos.y) * uTexScale;
            }
        "#;

        let fragment_shader = r#"
            #version 330 core
            in vec2 TexCoord;
            out vec4 FragColor;

            uniform sampler2D uTexture;
            uniform float uOpacity;

            void main() {
                vec4 texColor = texture(uTexture, TexCoord);
                FragColor = vec4(texColor.rgb, texColor.a * uOpacity);
            }
        "#;

        unsafe {
            let vs = Self::compile(vertex_shader, gl::VERTEX_SHADER)?;
            let fs = Self::compile(fragment_shader, gl::FRAGMENT_SHADER)?;
            let program = Self::link(vs, fs)?;

            gl::DeleteShader(vs);
            gl::DeleteShader(fs);

            Ok(program)
        }
    }

    fn compile(source: &str, shader_type: u32) -> Result<u32> {
        unsafe {
            let shader = gl::CreateShader(shader_type);
            let c_str = CString::new(source).unwrap();
            gl::ShaderSource(shader, 1, &c_str.as_ptr(), ptr::null());
            gl::CompileShader(shader);

            let mut success = 0;
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut success);
            if success == 0 {
                let mut len = 0;
                gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
                let mut buffer = vec![0u8; len as usize];
                gl::GetShaderInfoLog(shader, len, ptr::null_mut(), buffer.as_mut_ptr() as *mut _);
                let error = String::from_utf8_lossy(&buffer);
                gl::DeleteShader(shader);
                anyhow::bail!("shader compilation failed: {}", error);
            }

            Ok(shader)
        }
    }

    fn link(vs: u32, fs: u32) -> Result<u32> {
        unsafe {
            let program = gl::CreateProgram();
            gl::AttachShader(program, vs);
            gl::AttachShader(program, fs);
            gl::LinkProgram(program);

            let mut success = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut success);
            if success == 0 {
                let mut len = 0;
                gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
                let mut buffer = vec![0u8; len as usize];
                gl::GetProgramInfoLog(program, len, ptr::null_mut(), buffer.as_mut_ptr() as *mut _);
                let error = String::from_utf8_lossy(&buffer);
                gl::DeleteProgram(program);
                anyhow::bail!("program linking failed: {}", error);
            }

            Ok(program)
        }
    }

    /// Build the quad mesh for a newly managed window.
    pub fn create_mesh(&self) -> QuadMesh {
        unsafe {
            let mut vao = 0;
            let mut vbo = 0;
            let mut ibo = 0;
            gl::GenVertexArrays(1, &mut vao);
            gl::BindVertexArray(vao);

            gl::GenBuffers(1, &mut vbo);
            gl::BindBuffer(gl::ARRAY_BUFFER, vbo);
            let vertices: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
            gl::BufferData(
                gl::ARRAY_BUFFER,
                std::mem::size_of_val(&vertices) as isize,
                vertices.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );
            gl::VertexAttribPointer(0, 2, gl::FLOAT, gl::FALSE, 0, ptr::null());
            gl::EnableVertexAttribArray(0);

            gl::GenBuffers(1, &mut ibo);
            gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, ibo);
            let indices: [u8; 6] = [0, 1, 2, 2, 3, 0];
            gl::BufferData(
                gl::ELEMENT_ARRAY_BUFFER,
                std::mem::size_of_val(&indices) as isize,
                indices.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );

            gl::BindVertexArray(0);

            QuadMesh {
                vao,
                vbo,
                ibo,
                index_count: indices.len() as i32,
            }
        }
    }

    pub fn destroy_mesh(&self, vao: u32, vbo: u32, ibo: u32) {
        unsafe {
            gl::DeleteBuffers(1, &vbo);
            gl::DeleteBuffers(1, &ibo);
            gl::DeleteVertexArrays(1, &vao);
        }
    }

    pub fn clear(&self, color: [f32; 4]) {
        unsafe {
            gl::ClearColor(color[0], color[1], color[2], color[3]);
            gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);
        }
    }

    pub fn viewport(&self, width: u32, height: u32) {
        unsafe {
            gl::Viewport(0, 0, width as i32, height as i32);
        }
    }

    /// Bind the shared texture object so the next texture-from-pixmap
    /// attach lands on it.
    pub fn bind_texture_target(&self) {
        unsafe {
            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(gl::TEXTURE_2D, self.texture);
        }
    }

    /// Draw one textured quad.
    ///
    /// `x, y, width, height` are screen pixels; `tex_offset`/`tex_scale`
    /// select the sampled region of the bound texture in image space
    /// (origin top-left), `(0,0)/(1,1)` for the whole window.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_quad(
        &self,
        vao: u32,
        index_count: i32,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        tex_offset: (f32, f32),
        tex_scale: (f32, f32),
        depth: f32,
        opacity: f32,
        screen_width: u32,
        screen_height: u32,
    ) {
        let sw = screen_width as f32;
        let sh = screen_height as f32;

        // X11 top-left origin to GL bottom-left NDC.
        let mut x_gl = (x as f32 / sw) * 2.0 - 1.0;
        let mut y_gl = 1.0 - ((y as f32 + height as f32) / sh) * 2.0;
        let w_gl = (width as f32 / sw) * 2.0;
        let h_gl = (height as f32 / sh) * 2.0;

        // Odd dimensions leave texel centers straddling pixel
        // boundaries; nudge by half a pixel so sampling stays crisp.
        if width % 2 == 1 {
            x_gl += 1.0 / sw;
        }
        if height % 2 == 1 {
            y_gl += 1.0 / sh;
        }

        unsafe {
            gl::UseProgram(self.program);
            gl::Uniform2f(self.u_position, x_gl, y_gl);
            gl::Uniform2f(self.u_size, w_gl, h_gl);
            gl::Uniform1f(self.u_depth, depth);
            gl::Uniform1f(self.u_opacity, opacity);
            gl::Uniform2f(self.u_tex_offset, tex_offset.0, tex_offset.1);
            gl::Uniform2f(self.u_tex_scale, tex_scale.0, tex_scale.1);

            gl::BindVertexArray(vao);
            gl::DrawElements(gl::TRIANGLES, index_count, gl::UNSIGNED_BYTE, ptr::null());
            gl::BindVertexArray(0);

            let err = gl::GetError();
            if err != gl::NO_ERROR {
                warn!("OpenGL error after draw: 0x{:x}", err);
            }
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            gl::DeleteTextures(1, &self.texture);
            gl::DeleteProgram(self.program);
        }
    }
}
