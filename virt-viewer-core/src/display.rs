//! Display surfaces
//!
//! A [`Display`] is one guest monitor within a session. It keeps the last
//! reported desktop size, zoom and enablement state plus a BGRA framebuffer
//! mirror used for snapshots. Key presses are queued on the display and
//! forwarded to the protocol backend by the owning session.

/// Minimum zoom level in percent
pub const ZOOM_MIN: u32 = 10;
/// Maximum zoom level in percent
pub const ZOOM_MAX: u32 = 400;
/// Default zoom level in percent
pub const ZOOM_DEFAULT: u32 = 100;
/// Zoom in/out step in percent
pub const ZOOM_STEP: u32 = 10;
/// Space kept free around a window when it is fitted to the local screen
pub const SCREEN_MARGIN: u32 = 64;

/// Bytes per framebuffer pixel (BGRA)
const BYTES_PER_PIXEL: usize = 4;

/// Largest desktop width or height accepted from a server
pub const MAX_DESKTOP_DIMENSION: u32 = 16384;

/// Framebuffer length for a desktop size, `None` when out of range
fn framebuffer_len(width: u32, height: u32) -> Option<usize> {
    if width > MAX_DESKTOP_DIMENSION || height > MAX_DESKTOP_DIMENSION {
        return None;
    }
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// X11 keysyms used by the key combinations
pub mod keysyms {
    /// Left control
    pub const CONTROL_L: u32 = 0xffe3;
    /// Left alt
    pub const ALT_L: u32 = 0xffe9;
    /// Delete
    pub const DELETE: u32 = 0xffff;
    /// Backspace
    pub const BACKSPACE: u32 = 0xff08;
    /// F1, F2..F12 follow consecutively
    pub const F1: u32 = 0xffbe;
    /// Print
    pub const PRINT: u32 = 0xff61;
}

/// Key combinations offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCombo {
    /// Ctrl+Alt+Del
    CtrlAltDel,
    /// Ctrl+Alt+Backspace
    CtrlAltBackspace,
    /// Ctrl+Alt+F1 .. Ctrl+Alt+F12
    CtrlAltF(u8),
    /// PrintScreen
    PrintScreen,
}

impl KeyCombo {
    /// Every combination, in menu order
    #[must_use]
    pub fn all() -> Vec<Self> {
        let mut combos = vec![Self::CtrlAltDel, Self::CtrlAltBackspace];
        combos.extend((1..=12).map(Self::CtrlAltF));
        combos.push(Self::PrintScreen);
        combos
    }

    /// Keysyms pressed in order (released in reverse)
    #[must_use]
    pub fn keysyms(&self) -> Vec<u32> {
        use keysyms::{ALT_L, BACKSPACE, CONTROL_L, DELETE, F1, PRINT};
        match *self {
            Self::CtrlAltDel => vec![CONTROL_L, ALT_L, DELETE],
            Self::CtrlAltBackspace => vec![CONTROL_L, ALT_L, BACKSPACE],
            Self::CtrlAltF(n) => {
                let n = u32::from(n.clamp(1, 12));
                vec![CONTROL_L, ALT_L, F1 + n - 1]
            }
            Self::PrintScreen => vec![PRINT],
        }
    }

    /// Menu label
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::CtrlAltDel => "Ctrl+Alt+Del".to_string(),
            Self::CtrlAltBackspace => "Ctrl+Alt+Backspace".to_string(),
            Self::CtrlAltF(n) => format!("Ctrl+Alt+F{n}"),
            Self::PrintScreen => "PrintScreen".to_string(),
        }
    }
}

/// A single key transition queued for the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    /// X11 keysym
    pub keysym: u32,
    /// Pressed (`true`) or released (`false`)
    pub down: bool,
}

/// Still image of a display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// BGRA pixel data, row-major
    pub data: Vec<u8>,
}

impl Snapshot {
    /// Returns the pixel at `(x, y)` as BGRA
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// One monitor surface within a session
#[derive(Debug, Clone)]
pub struct Display {
    nth: usize,
    desktop_width: u32,
    desktop_height: u32,
    zoom_level: u32,
    zoom_enabled: bool,
    enabled: bool,
    fullscreen: bool,
    monitor: Option<u32>,
    pointer_grabbed: bool,
    framebuffer: Vec<u8>,
    pending_keys: Vec<KeyPress>,
}

impl Display {
    /// Creates display `nth` with no desktop yet
    #[must_use]
    pub const fn new(nth: usize) -> Self {
        Self {
            nth,
            desktop_width: 0,
            desktop_height: 0,
            zoom_level: ZOOM_DEFAULT,
            zoom_enabled: true,
            enabled: true,
            fullscreen: false,
            monitor: None,
            pointer_grabbed: false,
            framebuffer: Vec::new(),
            pending_keys: Vec::new(),
        }
    }

    /// Index assigned by the protocol backend
    #[must_use]
    pub const fn nth(&self) -> usize {
        self.nth
    }

    /// Last reported guest resolution
    #[must_use]
    pub const fn desktop_size(&self) -> (u32, u32) {
        (self.desktop_width, self.desktop_height)
    }

    /// Records the guest resolution
    ///
    /// Returns `true` when the size actually changed, in which case the
    /// caller emits a desktop-resize event. The framebuffer is reallocated
    /// and cleared on change. A size beyond [`MAX_DESKTOP_DIMENSION`] is
    /// rejected and the previous desktop kept.
    pub fn set_desktop_size(&mut self, width: u32, height: u32) -> bool {
        if self.desktop_width == width && self.desktop_height == height {
            return false;
        }
        let Some(len) = framebuffer_len(width, height) else {
            tracing::warn!(nth = self.nth, width, height, "Ignoring oversized desktop");
            return false;
        };
        self.desktop_width = width;
        self.desktop_height = height;
        self.framebuffer = vec![0; len];
        true
    }

    /// Zoom level in percent
    #[must_use]
    pub const fn zoom_level(&self) -> u32 {
        self.zoom_level
    }

    /// Sets the zoom level, clamped to `ZOOM_MIN..=ZOOM_MAX`
    pub fn set_zoom_level(&mut self, percent: u32) {
        self.zoom_level = percent.clamp(ZOOM_MIN, ZOOM_MAX);
    }

    /// Steps zoom up by [`ZOOM_STEP`]
    pub fn zoom_in(&mut self) {
        self.set_zoom_level(self.zoom_level.saturating_add(ZOOM_STEP));
    }

    /// Steps zoom down by [`ZOOM_STEP`]
    pub fn zoom_out(&mut self) {
        self.set_zoom_level(self.zoom_level.saturating_sub(ZOOM_STEP));
    }

    /// Restores 100% zoom
    pub fn zoom_reset(&mut self) {
        self.set_zoom_level(ZOOM_DEFAULT);
    }

    /// Whether zooming is in effect
    #[must_use]
    pub const fn zoom_enabled(&self) -> bool {
        self.zoom_enabled
    }

    /// Turns zooming on or off
    pub fn set_zoom_enabled(&mut self, enabled: bool) {
        self.zoom_enabled = enabled;
    }

    /// Whether the guest monitor is active
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the guest monitor; returns `true` on change
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    /// Whether the display is shown fullscreen
    #[must_use]
    pub const fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Client monitor the display is placed on when fullscreen
    #[must_use]
    pub const fn monitor(&self) -> Option<u32> {
        self.monitor
    }

    /// Sets fullscreen state and the client monitor it applies to
    pub fn set_fullscreen(&mut self, fullscreen: bool, monitor: Option<u32>) {
        self.fullscreen = fullscreen;
        self.monitor = if fullscreen { monitor } else { None };
    }

    /// Whether the pointer is currently grabbed
    #[must_use]
    pub const fn pointer_grabbed(&self) -> bool {
        self.pointer_grabbed
    }

    /// Records a pointer grab reported by the backend
    pub fn set_pointer_grabbed(&mut self, grabbed: bool) {
        self.pointer_grabbed = grabbed;
    }

    /// Releases a pointer grab; no-op when nothing is grabbed
    pub fn release_cursor(&mut self) {
        if self.pointer_grabbed {
            tracing::debug!(nth = self.nth, "Releasing pointer grab");
            self.pointer_grabbed = false;
        }
    }

    /// Queues a key sequence: presses in order, releases in reverse
    pub fn send_keys(&mut self, keysyms: &[u32]) {
        self.pending_keys.extend(keysyms.iter().map(|&keysym| KeyPress {
            keysym,
            down: true,
        }));
        self.pending_keys.extend(keysyms.iter().rev().map(|&keysym| KeyPress {
            keysym,
            down: false,
        }));
    }

    /// Queues a key combination
    pub fn send_combo(&mut self, combo: KeyCombo) {
        self.send_keys(&combo.keysyms());
    }

    /// Takes the queued key transitions
    pub fn take_pending_keys(&mut self) -> Vec<KeyPress> {
        std::mem::take(&mut self.pending_keys)
    }

    /// Copies a BGRA rectangle into the framebuffer mirror
    ///
    /// Rows falling outside the current desktop are clipped.
    pub fn apply_frame(&mut self, x: u32, y: u32, width: u32, height: u32, data: &[u8]) {
        let stride = self.desktop_width as usize * BYTES_PER_PIXEL;
        let x_end = (x.saturating_add(width)).min(self.desktop_width);
        if x >= x_end {
            return;
        }
        let copy_len = (x_end - x) as usize * BYTES_PER_PIXEL;
        let src_stride = width as usize * BYTES_PER_PIXEL;

        for row in 0..height {
            let dst_y = y.saturating_add(row);
            if dst_y >= self.desktop_height {
                break;
            }
            let src_start = row as usize * src_stride;
            let Some(src) = data.get(src_start..src_start + copy_len) else {
                break;
            };
            let dst_start = dst_y as usize * stride + x as usize * BYTES_PER_PIXEL;
            if let Some(dst) = self.framebuffer.get_mut(dst_start..dst_start + copy_len) {
                dst.copy_from_slice(src);
            }
        }
    }

    /// Copies a framebuffer area to another position
    ///
    /// The area is clipped to the desktop size.
    pub fn copy_rect(&mut self, src: (u32, u32), dst: (u32, u32), width: u32, height: u32) {
        let width = width.min(self.desktop_width);
        let height = height.min(self.desktop_height);
        let Some(area_len) = framebuffer_len(width, height) else {
            return;
        };
        let stride = self.desktop_width as usize * BYTES_PER_PIXEL;
        let row_len = width as usize * BYTES_PER_PIXEL;
        let mut area = vec![0u8; area_len];

        for row in 0..height {
            let src_y = src.1.saturating_add(row);
            if src_y >= self.desktop_height {
                break;
            }
            let visible = width.min(self.desktop_width.saturating_sub(src.0)) as usize;
            let start = src_y as usize * stride + src.0 as usize * BYTES_PER_PIXEL;
            let len = visible * BYTES_PER_PIXEL;
            if let Some(pixels) = self.framebuffer.get(start..start + len) {
                let offset = row as usize * row_len;
                area[offset..offset + len].copy_from_slice(pixels);
            }
        }
        self.apply_frame(dst.0, dst.1, width, height, &area);
    }

    /// Captures the current framebuffer
    #[must_use]
    pub fn get_snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.desktop_width,
            height: self.desktop_height,
            data: self.framebuffer.clone(),
        }
    }
}

/// Largest size with the desktop's aspect ratio that fits `alloc`
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn aspect_fit(desktop: (u32, u32), alloc: (u32, u32)) -> (u32, u32) {
    let (dw, dh) = desktop;
    let (aw, ah) = alloc;
    if dw == 0 || dh == 0 || aw == 0 || ah == 0 {
        return alloc;
    }
    let desktop_aspect = f64::from(dw) / f64::from(dh);
    let alloc_aspect = f64::from(aw) / f64::from(ah);
    if desktop_aspect > alloc_aspect {
        (aw, (f64::from(aw) / desktop_aspect).round() as u32)
    } else {
        ((f64::from(ah) * desktop_aspect).round() as u32, ah)
    }
}

/// Window size for a desktop at `zoom` percent on a local screen
///
/// When the zoomed desktop does not fit in the screen minus
/// [`SCREEN_MARGIN`] on either axis, it is shrunk keeping its aspect ratio.
#[must_use]
pub fn window_fit(desktop: (u32, u32), zoom: u32, screen: (u32, u32)) -> (u32, u32) {
    let zoom = u64::from(zoom.clamp(ZOOM_MIN, ZOOM_MAX));
    let scale = |v: u32| u32::try_from(u64::from(v) * zoom / 100).unwrap_or(u32::MAX);
    let width = scale(desktop.0);
    let height = scale(desktop.1);

    let max_w = screen.0.saturating_sub(SCREEN_MARGIN);
    let max_h = screen.1.saturating_sub(SCREEN_MARGIN);
    if width > max_w || height > max_h {
        aspect_fit((width, height), (max_w, max_h))
    } else {
        (width, height)
    }
}
