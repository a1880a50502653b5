use super::services::{PopupSpec, WindowBounds};
use crate::config::PopupConfig;

/// Places the popup centered over `bounds`, never closer than
/// `min_offset` to the top-left screen edge. Without bounds the popup goes
/// to the minimum offset.
pub fn popup_spec(url: String, bounds: Option<WindowBounds>, popup: &PopupConfig) -> PopupSpec {
    let width = popup.width as i32;
    let height = popup.height as i32;

    let (left, top) = match bounds {
        Some(b) => (
            (b.left + (b.width - width) / 2).max(popup.min_offset),
            (b.top + (b.height - height) / 2).max(popup.min_offset),
        ),
        None => (popup.min_offset, popup.min_offset),
    };

    PopupSpec {
        url,
        left,
        top,
        width: popup.width,
        height: popup.height,
    }
}
