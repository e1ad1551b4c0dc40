// surface: off-screen backing store for one window
// A tiny-skia Pixmap holds the pixels; blits hand the platform one u32 per
// pixel. Contents are not preserved across a reallocation.

use log::trace;
use tiny_skia::{Paint, Pixmap, Transform};

use crate::error::{Error, Result};
use crate::types::{Color, Rect};

pub struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    /// Allocates a cleared surface. Sizes below 1x1 are raised to 1x1.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let (width, height) = (width.max(1), height.max(1));
        let pixmap =
            Pixmap::new(width, height).ok_or(Error::SurfaceAllocation { width, height })?;
        trace!("surface {width}x{height} allocated");
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn fill(&mut self, color: Color) {
        self.pixmap.fill(to_skia(color));
    }

    /// Fills `rect`, clipped to the surface. Empty or inverted rects draw
    /// nothing.
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Some(area) =
            tiny_skia::Rect::from_xywh(rect.pos.x, rect.pos.y, rect.size.x, rect.size.y)
        else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color(to_skia(color));
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(area, &paint, Transform::identity(), None);
    }

    /// Premultiplied RGBA of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.pixmap
            .pixel(x, y)
            .map(|p| [p.red(), p.green(), p.blue(), p.alpha()])
    }

    /// The surface as one `u32` per pixel for the platform.
    ///
    /// By default the premultiplied RGBA bytes are reordered to BGRA, the
    /// order GDI-style blits expect. With `assume_bgra` the bytes are passed
    /// through as they are.
    pub fn frame_pixels(&self, assume_bgra: bool) -> Vec<u32> {
        let data = self.pixmap.data();
        if assume_bgra {
            return match bytemuck::try_cast_slice::<u8, u32>(data) {
                Ok(pixels) => pixels.to_vec(),
                Err(_) => data
                    .chunks_exact(4)
                    .map(|px| u32::from_ne_bytes([px[0], px[1], px[2], px[3]]))
                    .collect(),
            };
        }
        let mut out = Vec::with_capacity(self.width() as usize * self.height() as usize);
        for px in data.chunks_exact(4) {
            // RGBA -> BGRA, little endian: lowest byte is B
            out.push(u32::from_le_bytes([px[2], px[1], px[0], px[3]]));
        }
        out
    }
}

fn to_skia(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(
        channel(color.r),
        channel(color.g),
        channel(color.b),
        channel(color.a),
    )
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
