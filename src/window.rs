use std::fmt;
use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::{debug, info};

use crate::frame::CapturedFrame;

/// Windows shorter than this are menu-bar strips and similar, not content.
pub const MIN_WINDOW_HEIGHT: i32 = 32;

/// System surfaces that show up in the window list but are never worth mirroring.
pub const EXCLUDED_OWNERS: &[&str] = &["Dock", "Window Server", "Wallpaper"];

/// Opaque OS window handle. Only valid while the window is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct WindowInfo {
    pub window_id: WindowId,
    pub owner_name: String,
    pub window_title: String,
    pub height: i32,
}

impl WindowInfo {
    pub fn display_name(&self) -> String {
        format!("{} — {}", self.owner_name, self.window_title)
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    #[error("window {0} is no longer available for capture")]
    WindowUnavailable(WindowId),
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    #[error("could not create a bitmap for window {0}")]
    Bitmap(WindowId),
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    #[error("pixel buffer of {len} bytes does not match {width}x{height} RGBA")]
    BadBuffer { len: usize, width: u32, height: u32 },
    #[cfg_attr(target_os = "macos", allow(dead_code))]
    #[error("window capture is not supported on this platform")]
    Unsupported,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no window found for app name \"{app_name}\"")]
    NotFound { app_name: String },
    #[error("invalid window number {input:?}, expected a number from 1 to {count}")]
    InvalidSelection { input: String, count: usize },
    #[error("failed to list windows: {0:#}")]
    Enumeration(anyhow::Error),
    #[error("failed to read window selection: {0}")]
    Io(#[from] io::Error),
}

/// The two OS capabilities the mirror depends on.
pub trait WindowBackend {
    /// Every window the OS knows about, on- or off-screen.
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>>;

    /// Current contents of `id`, without frame decoration, even if occluded.
    fn capture(&self, id: WindowId) -> Result<CapturedFrame, CaptureError>;
}

/// Backend for platforms without a capture implementation.
#[cfg(not(target_os = "macos"))]
pub struct UnsupportedBackend;

#[cfg(not(target_os = "macos"))]
impl WindowBackend for UnsupportedBackend {
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        Err(anyhow::anyhow!("This app currently supports macOS only for window capture."))
    }

    fn capture(&self, _id: WindowId) -> Result<CapturedFrame, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

#[cfg(target_os = "macos")]
pub fn platform_backend() -> Box<dyn WindowBackend> {
    Box::new(crate::macos::QuartzBackend)
}

#[cfg(not(target_os = "macos"))]
pub fn platform_backend() -> Box<dyn WindowBackend> {
    Box::new(UnsupportedBackend)
}

/// Windows of `app_name` that are worth mirroring, sorted by (owner, title).
pub fn filter_candidates(windows: Vec<WindowInfo>, app_name: &str) -> Vec<WindowInfo> {
    let mut candidates: Vec<WindowInfo> = windows
        .into_iter()
        .filter(|w| w.height >= MIN_WINDOW_HEIGHT)
        .filter(|w| !w.window_title.is_empty())
        .filter(|w| !EXCLUDED_OWNERS.contains(&w.owner_name.as_str()))
        .filter(|w| w.owner_name == app_name)
        .collect();

    candidates.sort_by(|a, b| {
        a.owner_name
            .cmp(&b.owner_name)
            .then_with(|| a.window_title.cmp(&b.window_title))
    });
    candidates
}

/// Finds the window to mirror, asking on `output`/`input` when there is
/// more than one.
pub fn resolve<B, R, W>(backend: &B, app_name: &str, input: R, output: W) -> Result<WindowId, ResolveError>
where
    B: WindowBackend + ?Sized,
    R: BufRead,
    W: Write,
{
    let windows = backend.list_windows().map_err(ResolveError::Enumeration)?;
    debug!("Listed {} windows", windows.len());

    let candidates = filter_candidates(windows, app_name);
    let chosen = match candidates.len() {
        0 => {
            return Err(ResolveError::NotFound {
                app_name: app_name.to_string(),
            })
        }
        1 => &candidates[0],
        _ => &candidates[select_window(&candidates, app_name, input, output)?],
    };

    info!("Mirroring {} (window {})", chosen.display_name(), chosen.window_id);
    Ok(chosen.window_id)
}

/// Prints the numbered candidate list and returns the zero-based index the
/// user picked. Anything but a valid number is an error, not a re-prompt.
fn select_window<R: BufRead, W: Write>(
    candidates: &[WindowInfo],
    app_name: &str,
    mut input: R,
    mut output: W,
) -> Result<usize, ResolveError> {
    writeln!(output, "Multiple windows found for app name \"{}\":", app_name)?;
    for (i, w) in candidates.iter().enumerate() {
        writeln!(output, "{}: {}", i + 1, w.window_title)?;
    }
    write!(output, "Enter window number: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();

    match answer.parse::<usize>() {
        Ok(n) if (1..=candidates.len()).contains(&n) => Ok(n - 1),
        _ => Err(ResolveError::InvalidSelection {
            input: answer.to_string(),
            count: candidates.len(),
        }),
    }
}
