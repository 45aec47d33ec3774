//! Touch grid view: owns the grid, the input mapper and the render loop, and
//! reacts to surface lifecycle and touch callbacks from the host.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::RwLockReadGuard;

use crate::color::{Color, ColorTable};
use crate::compositor::{CompositorSlot, SurfaceCompositor};
use crate::config::{BLOCK_SIZE, REFERENCE_WIDTH};
use crate::grid::{self, read_grid, write_grid, Grid, SharedGrid};
use crate::input::{BatchReport, InputMapper, TouchSample};
use crate::render::{LoopState, Painter, RenderLoop, RenderStats};
use crate::surface::{SharedSurface, SurfaceHost};

/// How blocks reach the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStrategy {
    /// The render thread draws every occupied block each frame.
    #[default]
    Direct,
    /// Input paints changed blocks into an off-screen buffer, the render
    /// thread blits it.
    Composite,
}

impl fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStrategy::Direct => write!(f, "direct"),
            RenderStrategy::Composite => write!(f, "composite"),
        }
    }
}

impl FromStr for RenderStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(RenderStrategy::Direct),
            "composite" | "bitmap" => Ok(RenderStrategy::Composite),
            _ => Err(format!("Invalid strategy '{}'. Valid values: direct, composite", s)),
        }
    }
}

/// What happens to a pointer's blocks when it lifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleasePolicy {
    /// Blocks stay highlighted, leaving a trail of everything touched.
    #[default]
    Keep,
    /// Blocks owned by the pointer are reset.
    Clear,
}

impl fmt::Display for ReleasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleasePolicy::Keep => write!(f, "keep"),
            ReleasePolicy::Clear => write!(f, "clear"),
        }
    }
}

impl FromStr for ReleasePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(ReleasePolicy::Keep),
            "clear" => Ok(ReleasePolicy::Clear),
            _ => Err(format!("Invalid release policy '{}'. Valid values: keep, clear", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSettings {
    pub strategy: RenderStrategy,
    pub release_policy: ReleasePolicy,
    pub background: Color,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            strategy: RenderStrategy::default(),
            release_policy: ReleasePolicy::default(),
            background: Color::BLACK,
        }
    }
}

pub struct TouchGridView<H: SurfaceHost + 'static> {
    settings: ViewSettings,
    colors: ColorTable,
    surface: Arc<SharedSurface<H>>,
    grid: SharedGrid,
    compositor: CompositorSlot,
    mapper: InputMapper,
    render: RenderLoop,
    scale: f32,
}

impl<H: SurfaceHost + 'static> TouchGridView<H> {
    /// Build a view for `host`, sizing the grid from the host's current size.
    pub fn new(host: H, settings: ViewSettings) -> Self {
        let colors = ColorTable::default();
        let (width, height) = host.size();
        log::info!("Initialize the grid matrix ({}x{}, {})", width, height, settings.strategy);
        let grid = grid::shared(Grid::initialize(width, height, BLOCK_SIZE));
        let compositor = CompositorSlot::new();
        let mapper = match settings.strategy {
            RenderStrategy::Direct => InputMapper::direct(Arc::clone(&grid), colors),
            RenderStrategy::Composite => {
                InputMapper::composite(Arc::clone(&grid), compositor.clone(), colors, settings.background)
            }
        };

        let view = Self {
            settings,
            colors,
            surface: Arc::new(SharedSurface::new(host)),
            grid,
            compositor,
            mapper,
            render: RenderLoop::new("grid-render"),
            scale: 1.0,
        };
        view.redraw();
        view
    }

    pub fn host(&self) -> &H {
        self.surface.host()
    }

    pub fn settings(&self) -> ViewSettings {
        self.settings
    }

    pub fn grid(&self) -> RwLockReadGuard<'_, Grid> {
        read_grid(&self.grid)
    }

    pub fn render_state(&self) -> LoopState {
        self.render.state()
    }

    pub fn render_stats(&self) -> RenderStats {
        self.render.stats()
    }

    /// Text scale factor relative to a 480 px reference. Cosmetic only.
    pub fn text_scale(&self) -> f32 {
        self.scale
    }

    fn painter(&self) -> Painter {
        match self.settings.strategy {
            RenderStrategy::Direct => Painter::Direct {
                grid: Arc::clone(&self.grid),
                colors: self.colors,
                background: self.settings.background,
            },
            RenderStrategy::Composite => Painter::Composite {
                compositor: self.compositor.clone(),
            },
        }
    }

    /// Replace the grid (and buffer) if the surface size differs from the grid's.
    fn resize_grid(&self, width: u32, height: u32) {
        let resized = {
            let mut grid = write_grid(&self.grid);
            if grid.surface_size() != (width, height) {
                log::info!(
                    "Surface is {}x{}, grid was built for {}x{}; rebuilding",
                    width,
                    height,
                    grid.surface_size().0,
                    grid.surface_size().1
                );
                *grid = Grid::initialize(width, height, BLOCK_SIZE);
                true
            } else {
                false
            }
        };

        if self.settings.strategy != RenderStrategy::Composite {
            return;
        }
        let stale = self
            .compositor
            .get()
            .map_or(true, |c| (c.width(), c.height()) != (width, height));
        if resized || stale {
            self.compositor
                .replace(SurfaceCompositor::new(width, height, self.settings.background));
            let painted = self.mapper.repaint_occupied();
            log::debug!("Repainted {} blocks into the new buffer", painted);
        }
    }

    /// Draw the current state on the calling thread. Skipped when the surface
    /// cannot be locked.
    pub fn redraw(&self) -> bool {
        let Some(mut frame) = self.surface.lock_frame() else {
            log::debug!("Surface unavailable, redraw skipped");
            return false;
        };
        if let Err(e) = self.painter().paint(&mut *frame) {
            log::debug!("Redraw abandoned: {}", e);
        }
        true
    }

    /// The surface exists: size the grid and buffer, then start rendering.
    pub fn on_surface_available(&mut self, width: u32, height: u32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Surface available: {}x{}", width, height);
        self.resize_grid(width, height);
        let painter = self.painter();
        self.render
            .start(Arc::clone(&self.surface), move |canvas: &mut H::Canvas| painter.paint(canvas))?;
        Ok(())
    }

    pub fn on_surface_size_changed(&mut self, width: u32, height: u32, format: i32) {
        self.scale = width.max(height) as f32 / REFERENCE_WIDTH;
        log::info!(
            "Surface changed: w={}, h={}, format={}, s={}",
            width,
            height,
            format,
            self.scale
        );
        self.resize_grid(width, height);
        self.redraw();
    }

    /// The surface is going away: stop rendering and release the buffer.
    pub fn on_surface_lost(&mut self) {
        log::info!("Surface lost, stopping render thread");
        self.render.stop();
        self.compositor.take();
    }

    pub fn on_touch_batch(&self, samples: &[TouchSample]) -> BatchReport {
        let report = self.mapper.apply_batch(samples);
        log::trace!("Touch batch: {:?}", report);
        report
    }

    /// Pointer-up/cancel hook, handled per the configured release policy.
    pub fn on_pointer_released(&self, pointer_id: i32) -> usize {
        self.mapper.release_pointer(pointer_id, self.settings.release_policy)
    }
}
