//! Property-based tests for zoom and window fitting

use proptest::prelude::*;
use virt_viewer_core::display::{Display, KeyCombo, SCREEN_MARGIN, aspect_fit, window_fit, keysyms};
use virt_viewer_core::{ZOOM_MAX, ZOOM_MIN};

// ============================================================================
// Strategies
// ============================================================================

fn arb_desktop() -> impl Strategy<Value = (u32, u32)> {
    (64u32..=8192, 64u32..=8192)
}

fn arb_screen() -> impl Strategy<Value = (u32, u32)> {
    (640u32..=3840, 480u32..=2160)
}

/// Cross-multiplied aspect error of `fitted` against `desktop`
fn aspect_error(desktop: (u32, u32), fitted: (u32, u32)) -> u64 {
    let lhs = u64::from(fitted.0) * u64::from(desktop.1);
    let rhs = u64::from(fitted.1) * u64::from(desktop.0);
    lhs.abs_diff(rhs)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A fitted window never exceeds the usable screen area
    #[test]
    fn prop_window_fits_screen(
        desktop in arb_desktop(),
        zoom in ZOOM_MIN..=ZOOM_MAX,
        screen in arb_screen(),
    ) {
        let (w, h) = window_fit(desktop, zoom, screen);
        prop_assert!(w <= screen.0 - SCREEN_MARGIN);
        prop_assert!(h <= screen.1 - SCREEN_MARGIN);
    }

    /// A zoomed desktop that fits is shown at exactly its zoomed size;
    /// one that does not is shrunk keeping its aspect ratio
    #[test]
    fn prop_window_fit_keeps_size_or_aspect(
        desktop in arb_desktop(),
        zoom in ZOOM_MIN..=ZOOM_MAX,
        screen in arb_screen(),
    ) {
        let zoomed = (desktop.0 * zoom / 100, desktop.1 * zoom / 100);
        let fitted = window_fit(desktop, zoom, screen);
        let max = (screen.0 - SCREEN_MARGIN, screen.1 - SCREEN_MARGIN);

        if zoomed.0 <= max.0 && zoomed.1 <= max.1 {
            prop_assert_eq!(fitted, zoomed);
        } else {
            prop_assert!(fitted.0 == max.0 || fitted.1 == max.1);
            prop_assert!(aspect_error(zoomed, fitted) <= u64::from(zoomed.0.max(zoomed.1)));
        }
    }

    /// aspect_fit fills one side of the allocation exactly
    #[test]
    fn prop_aspect_fit_fills_one_side(desktop in arb_desktop(), alloc in arb_screen()) {
        let (w, h) = aspect_fit(desktop, alloc);
        prop_assert!(w <= alloc.0 && h <= alloc.1);
        prop_assert!(w == alloc.0 || h == alloc.1);
    }

    /// Any requested zoom ends up inside the supported range
    #[test]
    fn prop_zoom_is_clamped(percent in any::<u32>(), steps in prop::collection::vec(any::<bool>(), 0..40)) {
        let mut display = Display::new(0);
        display.set_zoom_level(percent);
        prop_assert!((ZOOM_MIN..=ZOOM_MAX).contains(&display.zoom_level()));

        for zoom_in in steps {
            if zoom_in {
                display.zoom_in();
            } else {
                display.zoom_out();
            }
            prop_assert!((ZOOM_MIN..=ZOOM_MAX).contains(&display.zoom_level()));
        }
    }

    /// Function-key combos always map to F1..F12 behind Ctrl+Alt
    #[test]
    fn prop_function_key_combo(n in any::<u8>()) {
        let syms = KeyCombo::CtrlAltF(n).keysyms();
        prop_assert_eq!(syms.len(), 3);
        prop_assert_eq!(syms[0], keysyms::CONTROL_L);
        prop_assert_eq!(syms[1], keysyms::ALT_L);
        prop_assert!((keysyms::F1..keysyms::F1 + 12).contains(&syms[2]));
    }
}
