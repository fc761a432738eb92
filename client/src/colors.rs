use visitmap_shared::{NEUTRAL_FILL, parse_hex};

/// Opacity of a pin whose visit is still waiting for the server.
pub const PENDING_PIN_ALPHA: f64 = 0.55;

/// Format RGBA as a CSS color string.
pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r},{g},{b},{a})")
}

/// Brighten a color by a factor (1.0 = no change, >1.0 = brighter).
pub fn brighten(r: u8, g: u8, b: u8, factor: f64) -> (u8, u8, u8) {
    (
        ((r as f64 * factor).min(255.0)) as u8,
        ((g as f64 * factor).min(255.0)) as u8,
        ((b as f64 * factor).min(255.0)) as u8,
    )
}

/// CSS background for a pin marker.
pub fn pin_css(color: &str, pending: bool) -> String {
    let (r, g, b) = parse_hex(color)
        .or_else(|| parse_hex(NEUTRAL_FILL))
        .unwrap_or((128, 128, 128));
    let alpha = if pending { PENDING_PIN_ALPHA } else { 1.0 };
    rgba_css(r, g, b, alpha)
}

/// Ring drawn around a pin, a lighter shade of its fill.
pub fn pin_ring_css(color: &str) -> String {
    let (r, g, b) = parse_hex(color).unwrap_or((128, 128, 128));
    let (r, g, b) = brighten(r, g, b, 1.35);
    rgba_css(r, g, b, 0.9)
}
