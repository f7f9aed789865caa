//! Render the public tunnel URL as a terminal QR code for `--generate-qr`.

use qrcode::QrCode;

/// Render `url` as a QR code using half-block Unicode characters, two source rows per output
/// row, so the terminal glyph aspect ratio roughly matches a square module.
pub fn render_qr_unicode(url: &str) -> anyhow::Result<String> {
    let code = QrCode::new(url.as_bytes())?;
    let width = code.width();
    let modules: Vec<bool> = code.to_colors().iter().map(|c| *c == qrcode::Color::Dark).collect();

    let get = |x: i32, y: i32| -> bool {
        if x < 0 || y < 0 || x as usize >= width || y as usize >= width {
            false
        } else {
            modules[y as usize * width + x as usize]
        }
    };

    let mut out = String::new();
    let mut y = -1i32;
    while y < width as i32 + 1 {
        for x in -1..=width as i32 {
            let top = get(x, y);
            let bottom = get(x, y + 1);
            let glyph = match (top, bottom) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            };
            out.push(glyph);
        }
        out.push('\n');
        y += 2;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_non_empty_grid_for_a_url() {
        let rendered = render_qr_unicode("https://abcde.example.com").unwrap();
        assert!(!rendered.is_empty());
        assert!(rendered.contains('\n'));
    }
}
