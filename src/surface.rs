//! Drawable surface boundary.
//!
//! The host platform provides a [`SurfaceHost`] that hands out a canvas for one
//! frame and takes it back to post it. [`SharedSurface`] serializes access so
//! the render thread and ad-hoc redraws never interleave, and its [`Frame`]
//! guard releases the canvas on every path, including unwinding.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::color::Color;

/// Pixel format code reported with size changes for 32-bit RGBA surfaces.
pub const PIXEL_FORMAT_RGBA_8888: i32 = 1;

/// Pixel rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Intersection with a `width` x `height` area at the origin.
    pub fn clip(&self, width: u32, height: u32) -> Option<Rect> {
        let clipped = Rect {
            left: self.left.min(width),
            top: self.top.min(height),
            right: self.right.min(width),
            bottom: self.bottom.min(height),
        };
        if clipped.width() == 0 || clipped.height() == 0 {
            None
        } else {
            Some(clipped)
        }
    }
}

/// Failure inside a single render pass. The frame is abandoned, rendering goes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawError {
    /// Composite rendering without an off-screen buffer.
    NoBuffer,
    /// The target canvas has no pixels to draw into.
    EmptyTarget { width: u32, height: u32 },
}

impl fmt::Display for DrawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawError::NoBuffer => write!(f, "no off-screen buffer to composite"),
            DrawError::EmptyTarget { width, height } => {
                write!(f, "target canvas is empty ({}x{})", width, height)
            }
        }
    }
}

impl std::error::Error for DrawError {}

/// Minimal drawing target for one frame.
pub trait Canvas {
    fn size(&self) -> (u32, u32);

    fn clear(&mut self, color: Color);

    /// Fill `rect`, clipped to the canvas.
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Overwrite the start of row `y` with `pixels`, clipped to the canvas.
    fn write_row(&mut self, y: u32, pixels: &[Color]);
}

/// Platform side of the surface: lock a canvas, then post it.
pub trait SurfaceHost: Send + Sync {
    type Canvas: Canvas;

    fn size(&self) -> (u32, u32);

    /// Lock the surface for drawing. `None` while the surface is unavailable.
    fn acquire(&self) -> Option<Self::Canvas>;

    /// Unlock the canvas and publish its contents.
    fn release_and_present(&self, canvas: &mut Self::Canvas);
}

/// A surface host plus the lock that makes frame access exclusive.
pub struct SharedSurface<H: SurfaceHost> {
    host: H,
    lock: Mutex<()>,
}

impl<H: SurfaceHost> SharedSurface<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            lock: Mutex::new(()),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Lock a frame. Blocks while another thread holds one.
    pub fn lock_frame(&self) -> Option<Frame<'_, H>> {
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let canvas = self.host.acquire()?;
        Some(Frame {
            host: &self.host,
            canvas,
            _guard: guard,
        })
    }
}

/// Guard for one locked canvas. Dropping it releases and posts the frame.
pub struct Frame<'a, H: SurfaceHost> {
    host: &'a H,
    canvas: H::Canvas,
    _guard: MutexGuard<'a, ()>,
}

impl<H: SurfaceHost> Deref for Frame<'_, H> {
    type Target = H::Canvas;

    fn deref(&self) -> &Self::Target {
        &self.canvas
    }
}

impl<H: SurfaceHost> DerefMut for Frame<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.canvas
    }
}

impl<H: SurfaceHost> Drop for Frame<'_, H> {
    fn drop(&mut self) {
        self.host.release_and_present(&mut self.canvas);
    }
}

/// Software canvas over a row-major ARGB buffer.
#[derive(Debug, Clone)]
pub struct MemoryCanvas {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl MemoryCanvas {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x < self.width && y < self.height {
            Some(self.pixels[y as usize * self.width as usize + x as usize])
        } else {
            None
        }
    }
}

impl Canvas for MemoryCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Some(rect) = rect.clip(self.width, self.height) else {
            return;
        };
        let stride = self.width as usize;
        for y in rect.top..rect.bottom {
            let start = y as usize * stride;
            self.pixels[start + rect.left as usize..start + rect.right as usize].fill(color);
        }
    }

    fn write_row(&mut self, y: u32, pixels: &[Color]) {
        if y >= self.height {
            return;
        }
        let len = pixels.len().min(self.width as usize);
        let start = y as usize * self.width as usize;
        self.pixels[start..start + len].copy_from_slice(&pixels[..len]);
    }
}

struct MemoryState {
    front: MemoryCanvas,
    locked: bool,
}

/// In-memory double-buffered surface. Used by the headless host and tests.
pub struct MemorySurface {
    state: Mutex<MemoryState>,
    available: AtomicBool,
    presented: AtomicU64,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                front: MemoryCanvas::new(width, height, Color::BLACK),
                locked: false,
            }),
            available: AtomicBool::new(true),
            presented: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate the surface going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Change the surface size. The visible contents are cleared.
    pub fn resize(&self, width: u32, height: u32) {
        self.state().front = MemoryCanvas::new(width, height, Color::BLACK);
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }

    /// Copy of the last posted frame.
    pub fn snapshot(&self) -> MemoryCanvas {
        self.state().front.clone()
    }
}

impl SurfaceHost for MemorySurface {
    type Canvas = MemoryCanvas;

    fn size(&self) -> (u32, u32) {
        self.state().front.size()
    }

    fn acquire(&self) -> Option<MemoryCanvas> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        let mut state = self.state();
        if state.locked {
            return None;
        }
        state.locked = true;
        // The back buffer starts as a copy of what is on screen.
        Some(state.front.clone())
    }

    fn release_and_present(&self, canvas: &mut MemoryCanvas) {
        let mut state = self.state();
        state.locked = false;
        if canvas.size() != state.front.size() {
            log::debug!("Dropping frame drawn for a stale surface size");
            return;
        }
        std::mem::swap(&mut state.front, canvas);
        self.presented.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_clip() {
        let r = Rect::new(10, 10, 30, 30);
        assert_eq!(r.clip(20, 25), Some(Rect::new(10, 10, 20, 25)));
        assert_eq!(r.clip(10, 100), None);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut canvas = MemoryCanvas::new(4, 4, Color::BLACK);
        canvas.fill_rect(Rect::new(2, 2, 10, 10), Color::RED);
        assert_eq!(canvas.pixel(1, 1), Some(Color::BLACK));
        assert_eq!(canvas.pixel(3, 3), Some(Color::RED));
        assert_eq!(canvas.pixel(4, 4), None);
    }

    #[test]
    fn test_frame_guard_posts_on_drop() {
        let surface = SharedSurface::new(MemorySurface::new(8, 8));
        {
            let mut frame = surface.lock_frame().expect("surface available");
            frame.fill_rect(Rect::new(0, 0, 2, 2), Color::GREEN);
        }
        assert_eq!(surface.host().presented_frames(), 1);
        assert_eq!(surface.host().snapshot().pixel(1, 1), Some(Color::GREEN));
        // The canvas was handed back, so it can be locked again
        assert!(surface.lock_frame().is_some());
    }

    #[test]
    fn test_frame_guard_posts_on_panic() {
        let surface = SharedSurface::new(MemorySurface::new(8, 8));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _frame = surface.lock_frame().expect("surface available");
            panic!("draw failed");
        }));
        assert!(result.is_err());
        assert_eq!(surface.host().presented_frames(), 1);
        assert!(surface.lock_frame().is_some());
    }

    #[test]
    fn test_unavailable_surface() {
        let surface = SharedSurface::new(MemorySurface::new(8, 8));
        surface.host().set_available(false);
        assert!(surface.lock_frame().is_none());
        assert_eq!(surface.host().presented_frames(), 0);
    }

    #[test]
    fn test_stale_frame_is_dropped() {
        let surface = SharedSurface::new(MemorySurface::new(8, 8));
        {
            let mut frame = surface.lock_frame().expect("surface available");
            frame.clear(Color::RED);
            surface.host().resize(4, 4);
        }
        assert_eq!(surface.host().presented_frames(), 0);
        assert_eq!(surface.host().snapshot().size(), (4, 4));
    }
}
