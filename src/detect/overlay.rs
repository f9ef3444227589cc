use crate::detect::object::DetectedObject;

/// Box outline colour (RGB; alpha is left as it was).
pub const OUTLINE: [u8; 3] = [255, 255, 0];

/// Draw a 1-pixel outline along rows `y` and `y + height` and columns `x`
/// and `x + width`, corners included. Pixels outside the frame are skipped
/// rather than wrapped onto neighbouring rows.
pub fn draw_outline(pixels: &mut [u8], width: u32, height: u32, object: &DetectedObject) {
    let (x, y) = (object.x as i64, object.y as i64);
    let (w, h) = (object.width.max(0) as i64, object.height.max(0) as i64);

    let (frame_w, frame_h) = (width as i64, height as i64);

    for i in x.max(0)..=(x + w).min(frame_w - 1) {
        set(pixels, width, height, i, y);
        set(pixels, width, height, i, y + h);
    }
    for j in y.max(0)..(y + h).min(frame_h) {
        set(pixels, width, height, x, j);
        set(pixels, width, height, x + w, j);
    }
}

fn set(pixels: &mut [u8], width: u32, height: u32, x: i64, y: i64) {
    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
        return;
    }
    let offset = (y as usize * width as usize + x as usize) * 4;
    if let Some(px) = pixels.get_mut(offset..offset + 3) {
        px.copy_from_slice(&OUTLINE);
    }
}
