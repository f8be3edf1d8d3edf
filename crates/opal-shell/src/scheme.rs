//! The `opal://shell/...` resource handler.
//!
//! Shell assets live in the user's config directory; every successful
//! serve registers the file with the compositor so editing it triggers
//! a reload in the running shell. A missing file answers 200 with a
//! plain "not found" body rather than a status code: the shell renders
//! whatever body arrives, and a browser-level error page has no place
//! inside the desktop.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::ipc::ShellEndpoint;

pub const SCHEME: &str = "opal";
pub const DOMAIN: &str = "shell";

/// What goes back to the browser for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeResponse {
    pub status: u16,
    pub mime: String,
    pub body: Vec<u8>,
}

pub struct SchemeHandler {
    root: PathBuf,
}

impl Default for SchemeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemeHandler {
    /// Serve from `$HOME/.config/opal/`, `HOME` defaulting to the
    /// current directory.
    pub fn new() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        Self {
            root: PathBuf::from(home).join(".config").join(SCHEME),
        }
    }

    /// Serve from an explicit root instead of the user config dir.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn not_found(what: &str) -> SchemeResponse {
        SchemeResponse {
            status: 200,
            mime: "text/html".into(),
            body: format!("{} not found.", what).into_bytes(),
        }
    }

    /// Resolve and read a URL. Returns the response plus, on a
    /// successful serve, the absolute path to register for reload
    /// watching.
    pub fn handle(&self, url: &str) -> (SchemeResponse, Option<String>) {
        let prefix = format!("{}://{}/", SCHEME, DOMAIN);
        let Some(rel_path) = url.strip_prefix(&prefix) else {
            return (Self::not_found(url), None);
        };

        let target = self.root.join(rel_path);
        let Ok(body) = fs::read(&target) else {
            return (Self::not_found(&target.display().to_string()), None);
        };

        let mime = mime_guess::from_path(&target)
            .first_raw()
            .unwrap_or("text/html")
            .to_string();
        debug!("serving {} as {}", target.display(), mime);

        (
            SchemeResponse {
                status: 200,
                mime,
                body,
            },
            Some(target.display().to_string()),
        )
    }

    /// Handle a request and register the served file with the
    /// compositor. This is the entry point the browser host's scheme
    /// factory calls.
    pub fn serve(&self, url: &str, endpoint: &mut ShellEndpoint) -> SchemeResponse {
        let (response, registered) = self.handle(url);
        if let Some(path) = registered {
            endpoint.register_file(path);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler_with_files(files: &[(&str, &str)]) -> (tempfile::TempDir, SchemeHandler) {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, contents).unwrap();
        }
        let handler = SchemeHandler::with_root(dir.path());
        (dir, handler)
    }

    #[test]
    fn test_serves_file_and_registers_it() {
        let (dir, handler) = handler_with_files(&[("index.html", "<html>hi</html>")]);

        let (response, registered) = handler.handle("opal://shell/index.html");
        assert_eq!(response.status, 200);
        assert_eq!(response.mime, "text/html");
        assert_eq!(response.body, b"<html>hi</html>");
        assert_eq!(
            registered.as_deref(),
            Some(dir.path().join("index.html").display().to_string().as_str())
        );
    }

    #[test]
    fn test_mime_by_extension() {
        let (_dir, handler) =
            handler_with_files(&[("app/style.css", "body{}"), ("app/main.js", "init()")]);

        let (css, _) = handler.handle("opal://shell/app/style.css");
        assert_eq!(css.mime, "text/css");
        let (js, _) = handler.handle("opal://shell/app/main.js");
        assert!(js.mime.contains("javascript"));
    }

    #[test]
    fn test_unknown_extension_defaults_to_html() {
        let (_dir, handler) = handler_with_files(&[("widget.opalml", "<widget/>")]);
        let (response, registered) = handler.handle("opal://shell/widget.opalml");
        assert_eq!(response.mime, "text/html");
        assert!(registered.is_some());
    }

    #[test]
    fn test_missing_file_is_content_shaped() {
        let (dir, handler) = handler_with_files(&[]);
        let (response, registered) = handler.handle("opal://shell/nope.html");

        // Still a 200; the body names the missing path.
        assert_eq!(response.status, 200);
        let expected = format!("{} not found.", dir.path().join("nope.html").display());
        assert_eq!(response.body, expected.into_bytes());
        assert!(registered.is_none());
    }

    #[test]
    fn test_foreign_url_rejected() {
        let (_dir, handler) = handler_with_files(&[("index.html", "x")]);
        let (response, registered) = handler.handle("http://example.com/index.html");
        assert_eq!(response.body, b"http://example.com/index.html not found.");
        assert!(registered.is_none());
    }
}
