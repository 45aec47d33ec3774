//! Off-screen pixel buffer for the composite render strategy.
//!
//! The input path paints changed blocks straight into the buffer and the render
//! thread blits the whole buffer onto the surface every frame. Only the blit
//! takes the buffer lock. Cell writes are relaxed atomic stores outside it, so a
//! blit can catch a block half painted; the next frame shows it complete.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::color::Color;
use crate::surface::{Canvas, DrawError, Rect};

pub struct SurfaceCompositor {
    width: u32,
    height: u32,
    pixels: Vec<AtomicU32>,
    blit: Mutex<()>,
}

impl SurfaceCompositor {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        let len = width as usize * height as usize;
        let pixels = (0..len).map(|_| AtomicU32::new(background.argb())).collect();
        log::debug!("Off-screen buffer allocated: {}x{}", width, height);
        Self {
            width,
            height,
            pixels,
            blit: Mutex::new(()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        Some(Color(self.pixels[idx].load(Ordering::Relaxed)))
    }

    /// Paint a solid rectangle, clipped to the buffer.
    pub fn draw_cell(&self, rect: Rect, color: Color) {
        let Some(rect) = rect.clip(self.width, self.height) else {
            return;
        };
        let stride = self.width as usize;
        for y in rect.top..rect.bottom {
            let start = y as usize * stride;
            for px in &self.pixels[start + rect.left as usize..start + rect.right as usize] {
                px.store(color.argb(), Ordering::Relaxed);
            }
        }
    }

    /// Copy the buffer unscaled onto `canvas` at the origin.
    ///
    /// When sizes differ only the overlapping region is copied.
    pub fn present<C: Canvas + ?Sized>(&self, canvas: &mut C) -> Result<(), DrawError> {
        let (cw, ch) = canvas.size();
        if cw == 0 || ch == 0 {
            return Err(DrawError::EmptyTarget { width: cw, height: ch });
        }

        let _blit = self.blit.lock().unwrap_or_else(PoisonError::into_inner);
        let width = self.width.min(cw) as usize;
        let height = self.height.min(ch);
        let stride = self.width as usize;
        let mut row = Vec::with_capacity(width);
        for y in 0..height {
            let start = y as usize * stride;
            row.clear();
            row.extend(
                self.pixels[start..start + width]
                    .iter()
                    .map(|px| Color(px.load(Ordering::Relaxed))),
            );
            canvas.write_row(y, &row);
        }
        Ok(())
    }
}

/// Replaceable handle to the current buffer, shared by input and render paths.
///
/// Holders clone the inner `Arc`, so replacing the buffer on a size change never
/// invalidates a blit in progress.
#[derive(Clone, Default)]
pub struct CompositorSlot(Arc<Mutex<Option<Arc<SurfaceCompositor>>>>);

impl CompositorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<SurfaceCompositor>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, compositor: SurfaceCompositor) -> Arc<SurfaceCompositor> {
        let compositor = Arc::new(compositor);
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&compositor));
        compositor
    }

    pub fn take(&self) -> Option<Arc<SurfaceCompositor>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorTable;
    use crate::surface::MemoryCanvas;
    use std::thread;

    #[test]
    fn test_draw_cell_clips() {
        let buffer = SurfaceCompositor::new(30, 30, Color::BLACK);
        buffer.draw_cell(Rect::new(20, 20, 40, 40), Color::RED);
        assert_eq!(buffer.pixel(19, 19), Some(Color::BLACK));
        assert_eq!(buffer.pixel(29, 29), Some(Color::RED));
        assert_eq!(buffer.pixel(30, 30), None);
    }

    #[test]
    fn test_present_copies_unscaled() {
        let buffer = SurfaceCompositor::new(40, 40, Color::BLACK);
        buffer.draw_cell(Rect::new(20, 0, 40, 20), Color::CYAN);
        let mut canvas = MemoryCanvas::new(40, 40, Color::WHITE);
        buffer.present(&mut canvas).unwrap();
        assert_eq!(canvas.pixel(25, 5), Some(Color::CYAN));
        assert_eq!(canvas.pixel(5, 5), Some(Color::BLACK));
        assert_eq!(canvas.pixel(25, 25), Some(Color::BLACK));
    }

    #[test]
    fn test_present_size_mismatch() {
        let buffer = SurfaceCompositor::new(10, 10, Color::RED);
        let mut canvas = MemoryCanvas::new(20, 5, Color::WHITE);
        buffer.present(&mut canvas).unwrap();
        assert_eq!(canvas.pixel(9, 4), Some(Color::RED));
        assert_eq!(canvas.pixel(10, 4), Some(Color::WHITE));

        let mut empty = MemoryCanvas::new(0, 0, Color::WHITE);
        assert_eq!(
            buffer.present(&mut empty),
            Err(DrawError::EmptyTarget { width: 0, height: 0 })
        );
    }

    #[test]
    fn test_slot_replace_and_take() {
        let slot = CompositorSlot::new();
        assert!(slot.get().is_none());
        let first = slot.replace(SurfaceCompositor::new(4, 4, Color::BLACK));
        let held = slot.get().unwrap();
        assert!(Arc::ptr_eq(&first, &held));
        slot.replace(SurfaceCompositor::new(8, 8, Color::BLACK));
        // The old buffer stays usable for whoever still holds it
        assert_eq!(held.width(), 4);
        assert_eq!(slot.get().unwrap().width(), 8);
        assert!(slot.take().is_some());
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_blit_during_cell_writes_sees_only_whole_pixels() {
        let colors = ColorTable::default();
        let buffer = Arc::new(SurfaceCompositor::new(200, 120, Color::BLACK));
        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..20_000u32 {
                    let left = (i * 20) % 200;
                    let top = (i * 7 * 20) % 120;
                    buffer.draw_cell(Rect::new(left, top, left + 20, top + 20), colors.color_for(i as i32));
                }
            })
        };

        let mut canvas = MemoryCanvas::new(200, 120, Color::WHITE);
        let mut blits = 0;
        while !writer.is_finished() || blits == 0 {
            buffer.present(&mut canvas).unwrap();
            blits += 1;
            // A blit may catch a cell half painted, but every pixel is either
            // the background or one full table color
            for y in 0..120 {
                for x in 0..200 {
                    let c = canvas.pixel(x, y).unwrap();
                    assert!(c == Color::BLACK || colors.slot_of(c).is_some(), "({}, {}) = {}", x, y, c);
                }
            }
        }
        writer.join().unwrap();

        buffer.present(&mut canvas).unwrap();
        for y in (0..120).step_by(20) {
            for x in (0..200).step_by(20) {
                assert_eq!(canvas.pixel(x, y), buffer.pixel(x, y));
            }
        }
    }
}
