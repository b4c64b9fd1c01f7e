//! Viewport partitioning into raycast tiles.
//!
//! A [`TileGrid`] splits a viewport into `ceil(W / cw) x ceil(H / ch)` tiles
//! in row-major order. Tiles in the last column and row are clamped to the
//! viewport, so the tile set is disjoint and covers every pixel exactly once.

use stereocast_core::{Error, PixelRect, Result, ViewportSize};

/// One unit of raycast work: a clamped viewport sub-rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tile {
    /// Pixel rectangle, already clamped to the viewport
    pub rect: PixelRect,
    /// Position in the sweep's scan order
    pub sequence: u32,
}

/// Fixed partition of a viewport into chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    viewport: ViewportSize,
    chunk: ViewportSize,
    columns: u32,
    rows: u32,
}

impl TileGrid {
    /// Build a grid, rejecting degenerate geometry.
    pub fn new(viewport: ViewportSize, chunk: ViewportSize) -> Result<Self> {
        if viewport.is_empty() {
            return Err(Error::Config(format!("viewport {viewport} is empty")));
        }
        if chunk.is_empty() {
            return Err(Error::Config(format!("chunk size {chunk} is empty")));
        }
        if chunk.width > viewport.width || chunk.height > viewport.height {
            return Err(Error::Config(format!(
                "chunk size {chunk} is larger than viewport {viewport}"
            )));
        }

        let columns = viewport.width.div_ceil(chunk.width);
        let rows = viewport.height.div_ceil(chunk.height);
        if columns.checked_mul(rows).is_none() {
            return Err(Error::Config(format!(
                "{columns}x{rows} tiles of {chunk} over {viewport} is too many"
            )));
        }

        Ok(Self {
            viewport,
            chunk,
            columns,
            rows,
        })
    }

    #[inline]
    pub const fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    #[inline]
    pub const fn chunk(&self) -> ViewportSize {
        self.chunk
    }

    #[inline]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    #[inline]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of tiles in one sweep. Fits in `u32` by construction.
    #[inline]
    pub const fn tile_count(&self) -> u32 {
        self.columns * self.rows
    }

    /// Tile with the given scan-order sequence number.
    pub fn tile(&self, sequence: u32) -> Option<Tile> {
        if sequence >= self.tile_count() {
            return None;
        }
        let column = sequence % self.columns;
        let row = sequence / self.columns;
        let rect = PixelRect::new(
            column * self.chunk.width,
            row * self.chunk.height,
            self.chunk.width,
            self.chunk.height,
        )
        .clamp_to(self.viewport);
        Some(Tile { rect, sequence })
    }

    /// Sequence number of the tile containing a pixel.
    pub fn tile_at(&self, x: u32, y: u32) -> Option<u32> {
        self.viewport
            .contains(x, y)
            .then(|| (y / self.chunk.height) * self.columns + x / self.chunk.width)
    }

    /// All tiles of a sweep in scan order.
    pub fn tiles(&self) -> TileIter {
        TileIter {
            grid: *self,
            next: 0,
        }
    }
}

/// Iterator over the tiles of a [`TileGrid`].
pub struct TileIter {
    grid: TileGrid,
    next: u32,
}

impl Iterator for TileIter {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        let tile = self.grid.tile(self.next)?;
        self.next += 1;
        Some(tile)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.tile_count().saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TileIter {}
