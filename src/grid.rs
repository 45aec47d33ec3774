//! Block grid holding the last known touch state of every cell.
//!
//! The grid is shared between the input path (single writer) and the render
//! thread (reader) as a [`SharedGrid`]. Writers take the lock once per touch
//! batch, readers once per render pass.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::INVALID_TOUCH_ID;
use crate::orientation::Orientation;
use crate::surface::Rect;

/// Position of a block in canonical grid space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockCoord {
    pub row: usize,
    pub col: usize,
}

impl BlockCoord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// One grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Pointer occupying the block, or `INVALID_TOUCH_ID`.
    pub touch_id: i32,
    /// Last raw sample mapped into this block.
    pub position: (i32, i32),
    pub pressure: f32,
    pub contact_size: i32,
    pub location: BlockCoord,
    /// Visual state changed since the block was last painted into the
    /// off-screen buffer. Only the composite strategy keeps it set; the direct
    /// strategy redraws every occupied block and discards the flags.
    pub dirty: bool,
}

impl Block {
    fn new(location: BlockCoord) -> Self {
        Self {
            touch_id: INVALID_TOUCH_ID,
            position: (0, 0),
            pressure: 0.0,
            contact_size: 0,
            location,
            dirty: false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.touch_id != INVALID_TOUCH_ID
    }
}

/// Shape of a grid and how it maps onto surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    pub rows: usize,
    pub cols: usize,
    pub block_size: u32,
    pub orientation: Orientation,
    /// Surface size in screen pixels. The last row and column of blocks may
    /// reach past it.
    pub surface_width: u32,
    pub surface_height: u32,
}

impl GridGeometry {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// Whether a screen pixel lies on the surface.
    pub fn on_surface(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.surface_width && (y as u32) < self.surface_height
    }

    /// Surface pixel extent of a block.
    pub fn block_rect(&self, coord: BlockCoord) -> Rect {
        let (left, top) = self
            .orientation
            .block_origin(coord.row as u32, coord.col as u32, self.block_size);
        Rect::new(left, top, left + self.block_size, top + self.block_size)
    }
}

/// Row-major block storage in canonical orientation (rows = long side).
#[derive(Debug, Clone)]
pub struct Grid {
    geometry: GridGeometry,
    blocks: Vec<Block>,
}

impl Grid {
    /// Size a grid to cover a `screen_width` x `screen_height` surface.
    ///
    /// Counts round up so the blocks cover the whole surface. A zero block size
    /// or dimension gives an empty grid.
    pub fn initialize(screen_width: u32, screen_height: u32, block_size: u32) -> Self {
        let orientation = Orientation::from_dimensions(screen_width, screen_height);
        let (long, short) = orientation.canonical_dimensions(screen_width, screen_height);
        let (rows, cols) = if block_size == 0 {
            (0, 0)
        } else {
            (
                long.div_ceil(block_size) as usize,
                short.div_ceil(block_size) as usize,
            )
        };

        let mut blocks = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                blocks.push(Block::new(BlockCoord::new(row, col)));
            }
        }

        log::debug!(
            "Grid initialized: {}x{} surface, {} rows x {} cols ({})",
            screen_width,
            screen_height,
            rows,
            cols,
            orientation
        );

        Self {
            geometry: GridGeometry {
                rows,
                cols,
                block_size,
                orientation,
                surface_width: screen_width,
                surface_height: screen_height,
            },
            blocks,
        }
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    pub fn cols(&self) -> usize {
        self.geometry.cols
    }

    pub fn block_size(&self) -> u32 {
        self.geometry.block_size
    }

    pub fn orientation(&self) -> Orientation {
        self.geometry.orientation
    }

    /// Surface size the grid was built for.
    pub fn surface_size(&self) -> (u32, u32) {
        (self.geometry.surface_width, self.geometry.surface_height)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        self.geometry
            .contains(row, col)
            .then(|| row * self.geometry.cols + col)
    }

    pub fn block(&self, row: usize, col: usize) -> Option<&Block> {
        self.index(row, col).map(|i| &self.blocks[i])
    }

    pub fn block_rect(&self, coord: BlockCoord) -> Rect {
        self.geometry.block_rect(coord)
    }

    /// Record a sample in a block. Out of bounds is a silent no-op.
    ///
    /// Returns true when the occupying pointer changed, which is also the only
    /// case that marks the block dirty.
    pub fn set_block(
        &mut self,
        row: usize,
        col: usize,
        touch_id: i32,
        position: (i32, i32),
        pressure: f32,
        size: i32,
    ) -> bool {
        let Some(i) = self.index(row, col) else {
            return false;
        };
        let block = &mut self.blocks[i];
        block.position = position;
        block.pressure = pressure;
        block.contact_size = size;
        if block.touch_id == touch_id {
            return false;
        }
        block.touch_id = touch_id;
        block.dirty = true;
        true
    }

    /// Reset a block to the unoccupied state. Returns true if it was occupied.
    pub fn clear_block(&mut self, row: usize, col: usize) -> bool {
        let Some(i) = self.index(row, col) else {
            return false;
        };
        let block = &mut self.blocks[i];
        let was_occupied = block.is_occupied();
        let pending = block.dirty;
        *block = Block::new(block.location);
        block.dirty = was_occupied || pending;
        was_occupied
    }

    /// Clear every block held by `touch_id`. Returns how many were cleared.
    pub fn clear_pointer(&mut self, touch_id: i32) -> usize {
        if touch_id == INVALID_TOUCH_ID {
            return 0;
        }
        let owned: Vec<BlockCoord> = self
            .blocks
            .iter()
            .filter(|b| b.touch_id == touch_id)
            .map(|b| b.location)
            .collect();
        for coord in &owned {
            self.clear_block(coord.row, coord.col);
        }
        owned.len()
    }

    /// Occupied blocks in row-major order. Each call starts from the top.
    pub fn occupied(&self) -> impl Iterator<Item = &Block> + '_ {
        self.blocks.iter().filter(|b| b.is_occupied())
    }

    /// Yield dirty blocks in row-major order, clearing each flag as it is taken.
    /// Blocks not reached before the iterator is dropped stay dirty.
    pub fn take_dirty(&mut self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.iter_mut().filter(|b| b.dirty).map(|b| {
            b.dirty = false;
            b.clone()
        })
    }

    /// Drop all pending dirty flags without painting. Returns how many were set.
    pub fn discard_dirty(&mut self) -> usize {
        self.take_dirty().count()
    }

    pub fn dirty_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.dirty).count()
    }

    /// Mark every occupied block dirty, e.g. after the paint target was replaced.
    pub fn mark_occupied_dirty(&mut self) -> usize {
        let mut count = 0;
        for block in self.blocks.iter_mut().filter(|b| b.is_occupied()) {
            block.dirty = true;
            count += 1;
        }
        count
    }
}

/// Grid handed between the input path and the render thread.
pub type SharedGrid = Arc<RwLock<Grid>>;

pub fn shared(grid: Grid) -> SharedGrid {
    Arc::new(RwLock::new(grid))
}

/// Read the grid, recovering it if a previous holder panicked.
pub fn read_grid(grid: &SharedGrid) -> RwLockReadGuard<'_, Grid> {
    grid.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write_grid(grid: &SharedGrid) -> RwLockWriteGuard<'_, Grid> {
    grid.write().unwrap_or_else(PoisonError::into_inner)
}
