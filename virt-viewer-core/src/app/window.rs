//! Top-level window state

use crate::display::{ZOOM_DEFAULT, ZOOM_MAX, ZOOM_MIN, ZOOM_STEP, window_fit};

/// One top-level surface, bound to at most one display
///
/// Window 0 lives as long as the App; the others follow the displays of
/// the same index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    nth: usize,
    display: Option<usize>,
    title: String,
    fullscreen: bool,
    monitor: Option<u32>,
    size: Option<(u32, u32)>,
    zoom: u32,
    visible: bool,
}

impl Window {
    /// Creates a hidden, unbound window
    #[must_use]
    pub fn new(nth: usize, zoom: u32) -> Self {
        Self {
            nth,
            display: None,
            title: String::new(),
            fullscreen: false,
            monitor: None,
            size: None,
            zoom: zoom.clamp(ZOOM_MIN, ZOOM_MAX),
            visible: false,
        }
    }

    /// Window index
    #[must_use]
    pub const fn nth(&self) -> usize {
        self.nth
    }

    /// Bound display index
    #[must_use]
    pub const fn display(&self) -> Option<usize> {
        self.display
    }

    /// Binds a display and shows the window
    pub fn bind(&mut self, display: usize) {
        self.display = Some(display);
        self.visible = true;
    }

    /// Drops the display binding
    pub fn unbind(&mut self) {
        self.display = None;
        self.size = None;
    }

    /// Whether the window is shown
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Hides the window
    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Current title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Sets the title from the App-wide base title
    ///
    /// Secondary windows carry their monitor number.
    pub fn set_title(&mut self, base: &str) {
        self.title = if self.nth == 0 {
            base.to_string()
        } else {
            format!("{base} ({})", self.nth + 1)
        };
    }

    /// Whether the window is fullscreen
    #[must_use]
    pub const fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Client monitor used while fullscreen
    #[must_use]
    pub const fn monitor(&self) -> Option<u32> {
        self.monitor
    }

    /// Enters or leaves fullscreen; window `n` goes to monitor `n`
    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
        self.monitor = if fullscreen {
            u32::try_from(self.nth).ok()
        } else {
            None
        };
    }

    /// Zoom level in percent
    #[must_use]
    pub const fn zoom(&self) -> u32 {
        self.zoom
    }

    /// Sets the zoom level, clamped to the supported range
    pub fn set_zoom(&mut self, percent: u32) {
        self.zoom = percent.clamp(ZOOM_MIN, ZOOM_MAX);
    }

    /// One step larger
    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom.saturating_add(ZOOM_STEP));
    }

    /// One step smaller
    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom.saturating_sub(ZOOM_STEP));
    }

    /// Back to 100%
    pub fn zoom_reset(&mut self) {
        self.zoom = ZOOM_DEFAULT;
    }

    /// Size the window was last fitted to
    #[must_use]
    pub const fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Fits the window to a guest desktop on a local screen
    pub fn fit(&mut self, desktop: (u32, u32), screen: (u32, u32)) -> (u32, u32) {
        let size = window_fit(desktop, self.zoom, screen);
        tracing::debug!(nth = self.nth, ?desktop, zoom = self.zoom, ?size, "Window fitted");
        self.size = Some(size);
        size
    }
}
