/// A fixed-width bitmap font. Each glyph is one byte per row, with the leftmost pixel in bit
/// `width - 1`.
pub struct Font {
    pub width: usize,
    pub height: usize,
    pub spacing: usize,
    glyphs: fn(char) -> Option<&'static [u8]>,
}

impl Font {
    pub fn glyph(&self, c: char) -> Option<&'static [u8]> {
        (self.glyphs)(c)
    }

    /// Width in pixels of `text` when written with this font.
    pub fn text_width(&self, text: &str) -> usize {
        let count = text.chars().count();
        (count * (self.width + self.spacing)).saturating_sub(self.spacing)
    }
}

/// 3x5 pixel font covering what the temperature readout needs.
pub const FONT_3X5: Font = Font {
    width: 3,
    height: 5,
    spacing: 1,
    glyphs: glyph_3x5,
};

fn glyph_3x5(c: char) -> Option<&'static [u8]> {
    Some(match c {
        '0' => &[0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => &[0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => &[0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => &[0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => &[0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => &[0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => &[0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => &[0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => &[0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => &[0b111, 0b101, 0b111, 0b001, 0b111],
        '-' => &[0b000, 0b000, 0b111, 0b000, 0b000],
        'C' => &[0b111, 0b100, 0b100, 0b100, 0b111],
        'F' => &[0b111, 0b100, 0b110, 0b100, 0b100],
        ' ' => &[0b000, 0b000, 0b000, 0b000, 0b000],
        _ => return None,
    })
}
