use std::time::{Duration, Instant};

use eframe::egui;
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::frame::fit_and_crop;
use crate::icon;
use crate::window::{WindowBackend, WindowId};

/// Log every Nth consecutive capture failure after the first.
const FAILURE_LOG_EVERY: u64 = 25;

/// Viewer settings
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub max_fps: u32,
    pub initial_size: [f32; 2],
    pub min_size: [f32; 2],
    pub title: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            max_fps: 5,
            initial_size: [640.0, 480.0],
            min_size: [320.0, 240.0],
            title: "Mirrored Window (press q to close)".to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.max_fps.max(1)))
    }
}

/// Repeating timer driven by the UI loop. The first tick is due immediately.
#[derive(Debug)]
pub struct TickTimer {
    interval: Duration,
    last: Option<Instant>,
}

impl TickTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Returns true and restarts the period if a tick is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Updated,
    Skipped,
}

/// Capture side of the viewer: one window, at most one displayed frame.
pub struct Mirror {
    backend: Box<dyn WindowBackend>,
    window_id: WindowId,
    current: Option<RgbaImage>,
    failures: u64,
}

impl Mirror {
    pub fn new(backend: Box<dyn WindowBackend>, window_id: WindowId) -> Self {
        Self {
            backend,
            window_id,
            current: None,
            failures: 0,
        }
    }

    /// Captures the window and fits it to a `width` x `height` pixel surface.
    /// On failure the previous frame stays current.
    pub fn tick(&mut self, width: u32, height: u32) -> TickOutcome {
        if width == 0 || height == 0 {
            return TickOutcome::Skipped;
        }

        match self.backend.capture(self.window_id) {
            Ok(frame) => {
                if self.failures > 0 {
                    info!("Capture recovered after {} failed ticks", self.failures);
                    self.failures = 0;
                }
                debug!("Captured {}x{}, showing at {}x{}", frame.width(), frame.height(), width, height);
                self.current = Some(fit_and_crop(&frame, width, height));
                TickOutcome::Updated
            }
            Err(e) => {
                if self.failures % FAILURE_LOG_EVERY == 0 {
                    warn!("Capture failed, keeping last frame: {}", e);
                }
                self.failures += 1;
                TickOutcome::Skipped
            }
        }
    }

    pub fn current(&self) -> Option<&RgbaImage> {
        self.current.as_ref()
    }
}

/// Converts a surface size in points to whole physical pixels.
pub fn surface_pixels(size: egui::Vec2, pixels_per_point: f32) -> (u32, u32) {
    let px = size * pixels_per_point;
    (px.x.round().max(0.0) as u32, px.y.round().max(0.0) as u32)
}

/// Asks the viewport to close when `q` or Escape was pressed this frame.
fn handle_close_keys(ctx: &egui::Context) -> bool {
    let close = ctx.input(|i| i.key_pressed(egui::Key::Q) || i.key_pressed(egui::Key::Escape));
    if close {
        info!("Close requested from keyboard");
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }
    close
}

/// Where a frame of `frame_px` physical pixels is drawn: at its own size,
/// centered in `panel`, so a stale frame is never stretched during a resize.
fn frame_rect(panel: egui::Rect, frame_px: egui::Vec2, pixels_per_point: f32) -> egui::Rect {
    egui::Rect::from_center_size(panel.center(), frame_px / pixels_per_point)
}

pub struct MirrorApp {
    mirror: Mirror,
    timer: TickTimer,
    texture: Option<egui::TextureHandle>,
}

impl MirrorApp {
    pub fn new(mirror: Mirror, config: &ViewerConfig) -> Self {
        Self {
            mirror,
            timer: TickTimer::new(config.tick_interval()),
            texture: None,
        }
    }

    fn upload(&mut self, ctx: &egui::Context) {
        let Some(frame) = self.mirror.current() else {
            return;
        };
        let image = egui::ColorImage::from_rgba_premultiplied(
            [frame.width() as usize, frame.height() as usize],
            frame.as_raw(),
        );
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("mirror", image, egui::TextureOptions::LINEAR));
            }
        }
    }
}

impl eframe::App for MirrorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        handle_close_keys(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let available = ui.available_size();
                if self.timer.poll(Instant::now()) {
                    let (w, h) = surface_pixels(available, ctx.pixels_per_point());
                    if self.mirror.tick(w, h) == TickOutcome::Updated {
                        self.upload(ctx);
                    }
                }
                if let Some(texture) = &self.texture {
                    let rect = frame_rect(ui.max_rect(), texture.size_vec2(), ctx.pixels_per_point());
                    ui.put(rect, egui::Image::new((texture.id(), rect.size())));
                }
            });

        ctx.set_cursor_icon(egui::CursorIcon::Crosshair);
        ctx.request_repaint_after(self.timer.remaining(Instant::now()));
    }
}

/// Opens the viewer window and blocks until it is closed.
pub fn run(config: ViewerConfig, mirror: Mirror) -> eframe::Result<()> {
    let mut viewport = egui::ViewportBuilder::default()
        .with_title(config.title.clone())
        .with_inner_size(config.initial_size)
        .with_min_inner_size(config.min_size);
    if let Some(icon) = icon::glyph_icon(128) {
        viewport = viewport.with_icon(icon);
    }
    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    info!("Starting viewer at {} fps", config.max_fps.max(1));
    let app = MirrorApp::new(mirror, &config);
    eframe::run_native(
        &config.title,
        native_options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CapturedFrame;
    use crate::window::{CaptureError, WindowInfo};
    use image::Rgba;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Serves a solid frame whose red channel counts captures, until closed.
    struct FakeWindow {
        closed: Rc<Cell<bool>>,
        captures: Cell<u8>,
    }

    impl WindowBackend for FakeWindow {
        fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
            Ok(Vec::new())
        }

        fn capture(&self, id: WindowId) -> Result<CapturedFrame, CaptureError> {
            if self.closed.get() {
                return Err(CaptureError::WindowUnavailable(id));
            }
            let n = self.captures.get() + 1;
            self.captures.set(n);
            CapturedFrame::new(8, 6, [n, 0, 0, 255].repeat(8 * 6))
        }
    }

    fn mirror() -> (Mirror, Rc<Cell<bool>>) {
        let closed = Rc::new(Cell::new(false));
        let backend = FakeWindow {
            closed: closed.clone(),
            captures: Cell::new(0),
        };
        (Mirror::new(Box::new(backend), WindowId(9)), closed)
    }

    #[test]
    fn default_config_ticks_every_200ms() {
        assert_eq!(ViewerConfig::default().tick_interval(), Duration::from_millis(200));
        let zero = ViewerConfig { max_fps: 0, ..Default::default() };
        assert_eq!(zero.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn timer_fires_immediately_then_each_interval() {
        let start = Instant::now();
        let mut timer = TickTimer::new(Duration::from_millis(200));
        assert_eq!(timer.remaining(start), Duration::ZERO);
        assert!(timer.poll(start));
        assert!(!timer.poll(start + Duration::from_millis(150)));
        assert_eq!(timer.remaining(start + Duration::from_millis(150)), Duration::from_millis(50));
        assert!(timer.poll(start + Duration::from_millis(200)));
        assert!(!timer.poll(start + Duration::from_millis(399)));
    }

    #[test]
    fn tick_replaces_frame_at_surface_size() {
        let (mut mirror, _) = mirror();
        assert!(mirror.current().is_none());

        assert_eq!(mirror.tick(640, 480), TickOutcome::Updated);
        assert_eq!(mirror.current().unwrap().dimensions(), (640, 480));

        assert_eq!(mirror.tick(320, 240), TickOutcome::Updated);
        let frame = mirror.current().unwrap();
        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(*frame.get_pixel(160, 120), Rgba([2, 0, 0, 255]));
    }

    #[test]
    fn closed_window_keeps_last_frame() {
        let (mut mirror, closed) = mirror();
        assert_eq!(mirror.tick(320, 240), TickOutcome::Updated);
        let before = mirror.current().unwrap().clone();

        closed.set(true);
        for _ in 0..3 {
            assert_eq!(mirror.tick(320, 240), TickOutcome::Skipped);
        }
        assert_eq!(mirror.current(), Some(&before));

        closed.set(false);
        assert_eq!(mirror.tick(320, 240), TickOutcome::Updated);
        assert_ne!(mirror.current(), Some(&before));
    }

    #[test]
    fn empty_surface_skips_capture() {
        let (mut mirror, _) = mirror();
        assert_eq!(mirror.tick(0, 240), TickOutcome::Skipped);
        assert!(mirror.current().is_none());
    }

    fn press(key: egui::Key) -> (bool, egui::FullOutput) {
        let ctx = egui::Context::default();
        let input = egui::RawInput {
            events: vec![egui::Event::Key {
                key,
                physical_key: None,
                pressed: true,
                repeat: false,
                modifiers: egui::Modifiers::NONE,
            }],
            ..Default::default()
        };
        let mut closed = false;
        let output = ctx.run(input, |ctx| closed = handle_close_keys(ctx));
        (closed, output)
    }

    fn close_sent(output: &egui::FullOutput) -> bool {
        output.viewport_output[&egui::ViewportId::ROOT]
            .commands
            .iter()
            .any(|c| matches!(c, egui::ViewportCommand::Close))
    }

    #[test]
    fn q_closes_viewer() {
        let (closed, output) = press(egui::Key::Q);
        assert!(closed);
        assert!(close_sent(&output));
    }

    #[test]
    fn escape_closes_viewer() {
        let (closed, output) = press(egui::Key::Escape);
        assert!(closed);
        assert!(close_sent(&output));
    }

    #[test]
    fn other_keys_keep_viewer_open() {
        let (closed, output) = press(egui::Key::W);
        assert!(!closed);
        assert!(!close_sent(&output));
    }

    #[test]
    fn stale_frame_keeps_its_size_when_panel_grows() {
        let panel = egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(800.0, 600.0));

        // 640x480 px frame at 2x is 320x240 points, centered
        let rect = frame_rect(panel, egui::vec2(640.0, 480.0), 2.0);
        assert_eq!(rect.size(), egui::vec2(320.0, 240.0));
        assert_eq!(rect.center(), egui::pos2(400.0, 300.0));

        let rect = frame_rect(panel, egui::vec2(800.0, 600.0), 1.0);
        assert_eq!(rect, panel);
    }

    #[test]
    fn surface_size_in_physical_pixels() {
        assert_eq!(surface_pixels(egui::vec2(640.0, 480.0), 2.0), (1280, 960));
        assert_eq!(surface_pixels(egui::vec2(320.4, 239.6), 1.0), (320, 240));
    }
}
