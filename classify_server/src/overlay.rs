//! Draw predictions and frame rate onto frames.
//!
use std::path::Path;

use anyhow::{anyhow, Result};
use common::ranking::Prediction;
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_text_mut},
    rect::Rect,
};
use rusttype::{Font, Scale};

const MARGIN: u32 = 4;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BAR_COLOR: Rgb<u8> = Rgb([0, 160, 0]);

pub struct Overlay {
    font: Option<Font<'static>>,
    text_height: f32,
    bar_width: u32,
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            font: None,
            text_height: 16.0,
            bar_width: 120,
        }
    }
}

impl Overlay {
    /// Overlay drawing score bars only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: Font<'static>) -> Self {
        Self {
            font: Some(font),
            ..Self::default()
        }
    }

    pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let font = Font::try_from_vec(data)
            .ok_or_else(|| anyhow!("invalid font file {}", path.as_ref().display()))?;

        Ok(Self::with_font(font))
    }

    fn row_height(&self) -> u32 {
        self.text_height as u32 + MARGIN
    }

    /// Vertical offset of row `row`, row 0 holding the frame rate.
    fn row_offset(&self, row: usize) -> u32 {
        MARGIN + row as u32 * self.row_height()
    }

    /// Draw the frame rate and one row per prediction.
    ///
    /// Rows which do not fit into the frame are left out.
    pub fn draw(&self, frame: &mut RgbImage, predictions: &[Prediction], fps: f32) {
        if self.row_offset(0) + self.row_height() <= frame.height() {
            self.draw_text(frame, MARGIN, self.row_offset(0), &format!("{fps:.1} fps"));
        }

        for (i, prediction) in predictions.iter().enumerate() {
            let y = self.row_offset(i + 1);
            if y + self.row_height() > frame.height() {
                break;
            }

            let width = bar_length(prediction.score, self.bar_width)
                .min(frame.width().saturating_sub(MARGIN));
            if width > 0 {
                let bar = Rect::at(MARGIN as i32, y as i32).of_size(width, self.text_height as u32);
                draw_filled_rect_mut(frame, bar, BAR_COLOR);
            }

            self.draw_text(
                frame,
                MARGIN,
                y,
                &format!("{} {:.3}", prediction.label, prediction.score),
            );
        }
    }

    fn draw_text(&self, frame: &mut RgbImage, x: u32, y: u32, text: &str) {
        if let Some(font) = self.font.as_ref() {
            let scale = Scale::uniform(self.text_height);
            draw_text_mut(frame, TEXT_COLOR, x as i32, y as i32, scale, font, text);
        }
    }
}

/// Length of the bar for a score, with the score clamped to `[0, 1]`.
fn bar_length(score: f32, max: u32) -> u32 {
    if score.is_nan() {
        return 0;
    }
    (score.clamp(0.0, 1.0) * max as f32).round() as u32
}
