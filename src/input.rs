//! Map raw touch samples onto grid blocks.

use std::fmt;

use crate::color::{Color, ColorTable};
use crate::compositor::{CompositorSlot, SurfaceCompositor};
use crate::config::MAX_TOUCHPOINTS;
use crate::grid::{read_grid, write_grid, BlockCoord, Grid, GridGeometry, SharedGrid};
use crate::view::ReleasePolicy;

/// One pointer in a touch batch, as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchSample {
    pub pointer_id: i32,
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub size: f32,
}

impl TouchSample {
    pub fn new(pointer_id: i32, x: f32, y: f32) -> Self {
        Self {
            pointer_id,
            x,
            y,
            pressure: 1.0,
            size: 0.0,
        }
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = pressure;
        self
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    /// Integer pixel position, truncated toward zero.
    pub fn position(&self) -> (i32, i32) {
        (self.x as i32, self.y as i32)
    }
}

/// A sample that falls outside the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    pub x: i32,
    pub y: i32,
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) is outside the surface", self.x, self.y)
    }
}

impl std::error::Error for OutOfBounds {}

/// What happened to one touch batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub out_of_bounds: usize,
    /// Samples past `MAX_TOUCHPOINTS`, ignored.
    pub truncated: usize,
    /// Blocks painted into the off-screen buffer.
    pub painted: usize,
}

/// Map a surface pixel to the block under it.
pub fn map_sample(geometry: &GridGeometry, x: i32, y: i32) -> Result<BlockCoord, OutOfBounds> {
    let out = OutOfBounds { x, y };
    if geometry.block_size == 0 || !geometry.on_surface(x, y) {
        return Err(out);
    }
    let (cx, cy) = geometry.orientation.transform_touch(x, y);
    let col = (cx as u32 / geometry.block_size) as usize;
    let row = (cy as u32 / geometry.block_size) as usize;
    if geometry.contains(row, col) {
        Ok(BlockCoord::new(row, col))
    } else {
        Err(out)
    }
}

/// Paint every dirty block into `compositor` and clear the flags.
fn paint_dirty(grid: &mut Grid, compositor: &SurfaceCompositor, colors: &ColorTable, background: Color) -> usize {
    let geometry = grid.geometry();
    let mut painted = 0;
    for block in grid.take_dirty() {
        let color = if block.is_occupied() {
            colors.color_for(block.touch_id)
        } else {
            background
        };
        compositor.draw_cell(geometry.block_rect(block.location), color);
        painted += 1;
    }
    painted
}

/// Applies touch input to the shared grid.
///
/// With a compositor slot (composite strategy) changed blocks are painted into
/// the off-screen buffer on the calling thread, right after the grid update.
/// Without one, dirty flags are dropped as soon as they are set.
pub struct InputMapper {
    grid: SharedGrid,
    compositor: Option<CompositorSlot>,
    colors: ColorTable,
    background: Color,
}

impl InputMapper {
    pub fn direct(grid: SharedGrid, colors: ColorTable) -> Self {
        Self {
            grid,
            compositor: None,
            colors,
            background: Color::BLACK,
        }
    }

    pub fn composite(grid: SharedGrid, compositor: CompositorSlot, colors: ColorTable, background: Color) -> Self {
        Self {
            grid,
            compositor: Some(compositor),
            colors,
            background,
        }
    }

    pub fn map_sample(&self, x: i32, y: i32) -> Result<BlockCoord, OutOfBounds> {
        map_sample(&read_grid(&self.grid).geometry(), x, y)
    }

    pub fn apply_batch(&self, samples: &[TouchSample]) -> BatchReport {
        let limit = samples.len().min(MAX_TOUCHPOINTS);
        let mut report = BatchReport {
            truncated: samples.len() - limit,
            ..BatchReport::default()
        };
        if report.truncated > 0 {
            log::debug!("Batch of {} pointers truncated to {}", samples.len(), limit);
        }

        let mut grid = write_grid(&self.grid);
        let geometry = grid.geometry();
        for sample in &samples[..limit] {
            let (x, y) = sample.position();
            match map_sample(&geometry, x, y) {
                Ok(coord) => {
                    grid.set_block(
                        coord.row,
                        coord.col,
                        sample.pointer_id,
                        (x, y),
                        sample.pressure,
                        sample.size as i32,
                    );
                    report.applied += 1;
                }
                Err(e) => {
                    log::debug!("Dropping sample from pointer {}: {}", sample.pointer_id, e);
                    report.out_of_bounds += 1;
                }
            }
        }

        report.painted = self.settle_dirty(&mut grid);
        report
    }

    /// Paint pending dirty blocks if there is a buffer to paint into. In the
    /// direct strategy the flags are discarded instead. A composite mapper
    /// whose buffer does not exist yet keeps them for `repaint_dirty`.
    fn settle_dirty(&self, grid: &mut Grid) -> usize {
        match &self.compositor {
            None => {
                grid.discard_dirty();
                0
            }
            Some(slot) => match slot.get() {
                Some(compositor) => paint_dirty(grid, &compositor, &self.colors, self.background),
                None => 0,
            },
        }
    }

    /// Pointer-up hook. Returns the number of blocks cleared.
    pub fn release_pointer(&self, pointer_id: i32, policy: ReleasePolicy) -> usize {
        match policy {
            ReleasePolicy::Keep => {
                log::debug!("Pointer {} released, keeping its blocks", pointer_id);
                0
            }
            ReleasePolicy::Clear => {
                let mut grid = write_grid(&self.grid);
                let cleared = grid.clear_pointer(pointer_id);
                self.settle_dirty(&mut grid);
                log::debug!("Pointer {} released, {} blocks cleared", pointer_id, cleared);
                cleared
            }
        }
    }

    /// Paint whatever is still dirty, e.g. blocks touched before the buffer existed.
    pub fn repaint_dirty(&self) -> usize {
        let Some(compositor) = self.compositor.as_ref().and_then(CompositorSlot::get) else {
            return 0;
        };
        let mut grid = write_grid(&self.grid);
        paint_dirty(&mut grid, &compositor, &self.colors, self.background)
    }

    /// Repaint all occupied blocks into a freshly allocated buffer.
    pub fn repaint_occupied(&self) -> usize {
        write_grid(&self.grid).mark_occupied_dirty();
        self.repaint_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BLOCK_SIZE;
    use crate::grid::{self, Grid};

    fn portrait_grid() -> SharedGrid {
        grid::shared(Grid::initialize(480, 800, BLOCK_SIZE))
    }

    #[test]
    fn test_map_sample_scenario() {
        let mapper = InputMapper::direct(portrait_grid(), ColorTable::default());
        assert_eq!(mapper.map_sample(25, 45), Ok(BlockCoord::new(2, 1)));
        assert_eq!(mapper.map_sample(1000, 45), Err(OutOfBounds { x: 1000, y: 45 }));
        assert!(mapper.map_sample(-1, 45).is_err());
        assert!(mapper.map_sample(25, 800).is_err());
    }

    #[test]
    fn test_every_on_screen_pixel_maps_in_bounds() {
        for (w, h) in [(480, 800), (800, 480), (490, 815), (33, 7)] {
            let grid = Grid::initialize(w, h, BLOCK_SIZE);
            let geometry = grid.geometry();
            for x in (0..w as i32).step_by(7).chain([w as i32 - 1]) {
                for y in (0..h as i32).step_by(7).chain([h as i32 - 1]) {
                    let coord = map_sample(&geometry, x, y)
                        .unwrap_or_else(|e| panic!("{}x{}: {}", w, h, e));
                    assert!(coord.row < grid.rows() && coord.col < grid.cols());
                }
            }
            for (x, y) in [(-1, 0), (0, -1), (w as i32, 0), (0, h as i32), (w as i32 + 20, 0), (0, h as i32 + 20)] {
                assert!(map_sample(&geometry, x, y).is_err(), "{}x{} ({}, {})", w, h, x, y);
            }
        }
    }

    #[test]
    fn test_partial_block_past_surface_edge_is_out_of_bounds() {
        // 490x810 rounds up to 25x41 blocks, so the last column and row reach
        // 10 px past the surface
        let grid = grid::shared(Grid::initialize(490, 810, BLOCK_SIZE));
        let mapper = InputMapper::direct(grid.clone(), ColorTable::default());
        assert_eq!(mapper.map_sample(495, 45), Err(OutOfBounds { x: 495, y: 45 }));
        assert_eq!(mapper.map_sample(25, 815), Err(OutOfBounds { x: 25, y: 815 }));
        assert_eq!(mapper.map_sample(489, 809), Ok(BlockCoord::new(40, 24)));

        let report = mapper.apply_batch(&[TouchSample::new(1, 495.0, 45.0), TouchSample::new(2, 25.0, 815.0)]);
        assert_eq!(report.applied, 0);
        assert_eq!(report.out_of_bounds, 2);
        assert_eq!(read_grid(&grid).occupied().count(), 0);

        let landscape = Grid::initialize(810, 490, BLOCK_SIZE);
        assert!(map_sample(&landscape.geometry(), 815, 25).is_err());
        assert!(map_sample(&landscape.geometry(), 25, 495).is_err());
        assert_eq!(map_sample(&landscape.geometry(), 809, 489), Ok(BlockCoord::new(40, 24)));
    }

    #[test]
    fn test_direct_mapper_keeps_no_dirty_flags() {
        let grid = portrait_grid();
        let mapper = InputMapper::direct(grid.clone(), ColorTable::default());
        mapper.apply_batch(&[TouchSample::new(3, 25.0, 45.0)]);
        mapper.apply_batch(&[TouchSample::new(3, 30.0, 50.0)]);
        assert!(!read_grid(&grid).block(2, 1).unwrap().dirty);

        mapper.apply_batch(&[TouchSample::new(5, 30.0, 50.0)]);
        assert_eq!(read_grid(&grid).block(2, 1).unwrap().touch_id, 5);
        assert_eq!(read_grid(&grid).dirty_count(), 0);

        assert_eq!(mapper.release_pointer(5, ReleasePolicy::Clear), 1);
        assert_eq!(read_grid(&grid).dirty_count(), 0);
    }

    #[test]
    fn test_landscape_mapping() {
        let grid = Grid::initialize(800, 480, BLOCK_SIZE);
        // x runs along the long side, so it selects the row
        assert_eq!(map_sample(&grid.geometry(), 45, 25), Ok(BlockCoord::new(2, 1)));
        assert_eq!(map_sample(&grid.geometry(), 799, 479), Ok(BlockCoord::new(39, 23)));
    }

    #[test]
    fn test_out_of_bounds_leaves_grid_unchanged() {
        let grid = portrait_grid();
        let mapper = InputMapper::direct(grid.clone(), ColorTable::default());
        let report = mapper.apply_batch(&[TouchSample::new(0, 1000.0, 45.0), TouchSample::new(1, -5.0, -5.0)]);
        assert_eq!(report.applied, 0);
        assert_eq!(report.out_of_bounds, 2);
        let grid = read_grid(&grid);
        assert_eq!(grid.occupied().count(), 0);
        assert_eq!(grid.dirty_count(), 0);
    }

    #[test_log::test]
    fn test_batch_truncated_to_max_touchpoints() {
        let grid = portrait_grid();
        let mapper = InputMapper::direct(grid.clone(), ColorTable::default());
        let samples: Vec<TouchSample> = (0..15)
            .map(|i| TouchSample::new(i, 10.0 + 20.0 * i as f32, 10.0))
            .collect();
        let report = mapper.apply_batch(&samples);
        assert_eq!(report.applied, 10);
        assert_eq!(report.truncated, 5);

        let grid = read_grid(&grid);
        let ids: Vec<i32> = grid.occupied().map(|b| b.touch_id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_sample_fields_recorded() {
        let grid = portrait_grid();
        let mapper = InputMapper::direct(grid.clone(), ColorTable::default());
        mapper.apply_batch(&[TouchSample::new(4, 25.9, 45.2).with_pressure(0.4).with_size(3.8)]);
        let grid = read_grid(&grid);
        let block = grid.block(2, 1).unwrap();
        assert_eq!(block.touch_id, 4);
        assert_eq!(block.position, (25, 45));
        assert_eq!(block.pressure, 0.4);
        assert_eq!(block.contact_size, 3);
    }

    #[test]
    fn test_composite_paints_only_changed_blocks() {
        let grid = portrait_grid();
        let slot = CompositorSlot::new();
        let buffer = slot.replace(SurfaceCompositor::new(480, 800, Color::BLACK));
        let colors = ColorTable::default();
        let mapper = InputMapper::composite(grid.clone(), slot, colors, Color::BLACK);

        let first = mapper.apply_batch(&[TouchSample::new(3, 25.0, 45.0)]);
        assert_eq!(first.painted, 1);
        assert_eq!(buffer.pixel(25, 45), Some(colors.color_for(3)));
        assert!(!read_grid(&grid).block(2, 1).unwrap().dirty);

        // Same pointer on the same block: nothing to repaint
        let second = mapper.apply_batch(&[TouchSample::new(3, 30.0, 50.0)]);
        assert_eq!(second.painted, 0);
        assert!(!read_grid(&grid).block(2, 1).unwrap().dirty);

        let third = mapper.apply_batch(&[TouchSample::new(5, 30.0, 50.0)]);
        assert_eq!(third.painted, 1);
        assert_eq!(buffer.pixel(20, 40), Some(colors.color_for(5)));
        assert_eq!(buffer.pixel(39, 59), Some(colors.color_for(5)));
        assert_eq!(buffer.pixel(40, 60), Some(Color::BLACK));
    }

    #[test]
    fn test_dirty_blocks_wait_for_buffer() {
        let grid = portrait_grid();
        let slot = CompositorSlot::new();
        let mapper = InputMapper::composite(grid.clone(), slot.clone(), ColorTable::default(), Color::BLACK);
        let report = mapper.apply_batch(&[TouchSample::new(1, 5.0, 5.0)]);
        assert_eq!(report.painted, 0);
        assert_eq!(read_grid(&grid).dirty_count(), 1);

        let buffer = slot.replace(SurfaceCompositor::new(480, 800, Color::BLACK));
        assert_eq!(mapper.repaint_dirty(), 1);
        assert_eq!(buffer.pixel(5, 5), Some(Color::RED));
    }

    #[test]
    fn test_release_policy() {
        let grid = portrait_grid();
        let slot = CompositorSlot::new();
        let buffer = slot.replace(SurfaceCompositor::new(480, 800, Color::BLACK));
        let mapper = InputMapper::composite(grid.clone(), slot, ColorTable::default(), Color::BLACK);
        mapper.apply_batch(&[TouchSample::new(2, 5.0, 5.0), TouchSample::new(2, 25.0, 5.0)]);

        assert_eq!(mapper.release_pointer(2, ReleasePolicy::Keep), 0);
        assert_eq!(read_grid(&grid).occupied().count(), 2);

        assert_eq!(mapper.release_pointer(2, ReleasePolicy::Clear), 2);
        assert_eq!(read_grid(&grid).occupied().count(), 0);
        assert_eq!(buffer.pixel(5, 5), Some(Color::BLACK));
        assert_eq!(buffer.pixel(25, 5), Some(Color::BLACK));
    }

    #[test]
    fn test_repaint_occupied() {
        let grid = portrait_grid();
        let slot = CompositorSlot::new();
        slot.replace(SurfaceCompositor::new(480, 800, Color::BLACK));
        let mapper = InputMapper::composite(grid, slot.clone(), ColorTable::default(), Color::BLACK);
        mapper.apply_batch(&[TouchSample::new(0, 5.0, 5.0)]);

        let fresh = slot.replace(SurfaceCompositor::new(480, 800, Color::BLACK));
        assert_eq!(fresh.pixel(5, 5), Some(Color::BLACK));
        assert_eq!(mapper.repaint_occupied(), 1);
        assert_eq!(fresh.pixel(5, 5), Some(Color::BLUE));
    }
}
