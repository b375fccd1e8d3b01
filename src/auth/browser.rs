//! Best-effort browser launching for the authorize step.

use std::sync::Arc;

/// Opens an authorization URL. Returns whether a browser was started.
pub type BrowserLauncher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Launcher backed by the platform's URL opener.
pub fn system_launcher() -> BrowserLauncher {
    Arc::new(try_open_browser)
}

/// Launcher that never opens anything; the URL is only logged.
pub fn no_launcher() -> BrowserLauncher {
    Arc::new(|_| false)
}

/// Spawn the platform URL opener without waiting for it.
pub fn try_open_browser(url: &str) -> bool {
    let mut command = if cfg!(target_os = "macos") {
        let mut c = std::process::Command::new("open");
        c.arg(url);
        c
    } else if cfg!(target_os = "windows") {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(url);
        c
    };
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .is_ok()
}
