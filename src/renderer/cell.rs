use crate::error::{MosaicError, Result};

/// A rectangular tile of a frame. Interior cells are `cell_size` square;
/// cells in the last column or row are clipped to the frame edge.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The tiling of one frame size, computed once and reused for every frame
/// of that size.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GridLayout {
    pub frame_width: u32,
    pub frame_height: u32,
    pub cell_size: u32,
    pub columns: u32,
    pub rows: u32,
    /// Row-major: all cells of grid row 0, then row 1, ...
    pub cells: Vec<Cell>,
}

impl GridLayout {
    pub fn new(frame_width: u32, frame_height: u32, column_count: u32) -> Result<Self> {
        let cell_size = cell_size_for(frame_width, column_count)?;
        let columns = frame_width.div_ceil(cell_size);
        let rows = frame_height.div_ceil(cell_size);

        let mut cells = Vec::with_capacity(columns as usize * rows as usize);
        for row in 0..rows {
            let y = row * cell_size;
            let height = cell_size.min(frame_height - y);
            for col in 0..columns {
                let x = col * cell_size;
                let width = cell_size.min(frame_width - x);
                cells.push(Cell {
                    x,
                    y,
                    width,
                    height,
                });
            }
        }

        Ok(Self {
            frame_width,
            frame_height,
            cell_size,
            columns,
            rows,
            cells,
        })
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.frame_width == width && self.frame_height == height
    }

    /// The cells of one grid row.
    pub fn row(&self, row: u32) -> &[Cell] {
        let start = (row * self.columns) as usize;
        &self.cells[start..start + self.columns as usize]
    }
}

/// Nominal cell edge: `width / column_count`, floored.
pub fn cell_size_for(frame_width: u32, column_count: u32) -> Result<u32> {
    if column_count == 0 {
        return Err(MosaicError::InvalidParameter(
            "column count must be at least 1".into(),
        ));
    }
    let cell_size = frame_width / column_count;
    if cell_size == 0 {
        return Err(MosaicError::InvalidParameter(format!(
            "{} columns do not fit a frame {} pixels wide",
            column_count, frame_width
        )));
    }
    Ok(cell_size)
}

/// Split a `width` x `height` frame into cells, row by row.
pub fn partition_grid(width: u32, height: u32, column_count: u32) -> Result<Vec<Cell>> {
    GridLayout::new(width, height, column_count).map(|layout| layout.cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(cells: &[Cell], width: u32, height: u32) {
        let mut hits = vec![0u8; (width * height) as usize];
        for cell in cells {
            assert!(cell.width > 0 && cell.height > 0);
            assert!(cell.x + cell.width <= width);
            assert!(cell.y + cell.height <= height);
            for y in cell.y..cell.y + cell.height {
                for x in cell.x..cell.x + cell.width {
                    hits[(y * width + x) as usize] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&h| h == 1), "cells must cover every pixel exactly once");
    }

    #[test]
    fn test_partition_covers_frame() {
        for &(w, h, g) in &[
            (100, 100, 5),
            (105, 100, 10),
            (7, 3, 7),
            (1, 1, 1),
            (64, 17, 3),
            (33, 90, 4),
        ] {
            let cells = partition_grid(w, h, g).unwrap();
            assert_exact_cover(&cells, w, h);
        }
    }

    #[test]
    fn test_partition_is_deterministic() {
        let a = partition_grid(321, 123, 17).unwrap();
        let b = partition_grid(321, 123, 17).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_edge_column_is_clipped() {
        let layout = GridLayout::new(105, 100, 10).unwrap();
        assert_eq!(layout.cell_size, 10);
        assert_eq!(layout.columns, 11);
        assert_eq!(layout.rows, 10);
        for cell in &layout.cells {
            if cell.x == 100 {
                assert_eq!(cell.width, 5);
            } else {
                assert_eq!(cell.width, 10);
            }
            assert_eq!(cell.height, 10);
        }
    }

    #[test]
    fn test_cells_are_square_even_when_height_is_not_divisible() {
        let layout = GridLayout::new(100, 55, 5).unwrap();
        assert_eq!(layout.cell_size, 20);
        assert_eq!(layout.rows, 3);
        let last = layout.row(2);
        assert!(last.iter().all(|c| c.height == 15 && c.y == 40));
    }

    #[test]
    fn test_zero_cell_size_is_rejected() {
        let err = partition_grid(100, 100, 1000).unwrap_err();
        assert!(matches!(err, MosaicError::InvalidParameter(_)));
        assert!(matches!(
            partition_grid(100, 100, 0),
            Err(MosaicError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_frame_has_no_cells() {
        assert!(partition_grid(10, 0, 2).unwrap().is_empty());
    }
}
