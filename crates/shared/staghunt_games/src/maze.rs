//! Perfect mazes on a rectangular grid.
//!
//! Coordinates are `(row, col)` with `(0, 0)` in the north-west corner.
//! North decreases the row, east increases the column.
//!
//! A generated grid is a spanning tree over all cells: exactly one simple path
//! joins any two cells. The grid also carries a *root*; rerooting keeps every
//! wall where it is and only re-orients the tree so that each cell knows its
//! next step toward the new root.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use staghunt::prng::Prng;
use thiserror::Error;

use crate::error::GameError;

// Wall bits per cell.
// 1=north, 2=east, 4=south, 8=west.
pub const W_NORTH: u8 = 1;
pub const W_EAST: u8 = 2;
pub const W_SOUTH: u8 = 4;
pub const W_WEST: u8 = 8;
const W_ALL: u8 = W_NORTH | W_EAST | W_SOUTH | W_WEST;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Cell {
    pub row: u32,
    pub col: u32,
}

impl Cell {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Straight-line distance.
    pub fn dist(self, other: Cell) -> f64 {
        let dr = self.row as f64 - other.row as f64;
        let dc = self.col as f64 - other.col as f64;
        (dr * dr + dc * dc).sqrt()
    }

    pub fn manhattan(self, other: Cell) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

impl From<[u32; 2]> for Cell {
    fn from(v: [u32; 2]) -> Self {
        Cell::new(v[0], v[1])
    }
}

impl From<Cell> for [u32; 2] {
    fn from(c: Cell) -> Self {
        [c.row, c.col]
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "W")]
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn wall_bit(self) -> u8 {
        match self {
            Direction::North => W_NORTH,
            Direction::East => W_EAST,
            Direction::South => W_SOUTH,
            Direction::West => W_WEST,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// `(d_row, d_col)`.
    pub fn offset(self) -> (i64, i64) {
        match self {
            Direction::North => (-1, 0),
            Direction::East => (0, 1),
            Direction::South => (1, 0),
            Direction::West => (0, -1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::East => "E",
            Direction::South => "S",
            Direction::West => "W",
        }
    }
}

/// A human move: one of the four exits or staying put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "W")]
    West,
    Stay,
}

impl Move {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Move::North => Some(Direction::North),
            Move::East => Some(Direction::East),
            Move::South => Some(Direction::South),
            Move::West => Some(Direction::West),
            Move::Stay => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self.direction() {
            Some(d) => d.as_str(),
            None => "Stay",
        }
    }
}

impl From<Direction> for Move {
    fn from(d: Direction) -> Self {
        match d {
            Direction::North => Move::North,
            Direction::East => Move::East,
            Direction::South => Move::South,
            Direction::West => Move::West,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised move {0:?} (expected N, E, S, W or Stay)")]
pub struct ParseMoveError(pub String);

impl FromStr for Move {
    type Err = ParseMoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "north" | "up" => Ok(Move::North),
            "e" | "east" | "right" => Ok(Move::East),
            "s" | "south" | "down" => Ok(Move::South),
            "w" | "west" | "left" => Ok(Move::West),
            "stay" | "x" | "." => Ok(Move::Stay),
            _ => Err(ParseMoveError(s.to_string())),
        }
    }
}

/// Persisted maze layout: one wall byte per cell, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallMap {
    pub rows: u32,
    pub cols: u32,
    pub walls: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Grid {
    rows: u32,
    cols: u32,
    cells: Vec<u8>,
    root: Cell,
    /// Next cell toward `root`, per cell.
    parent: Vec<Option<Cell>>,
    /// Bumped on every reroot; path tables remember the revision they saw.
    revision: u64,
}

impl Grid {
    /// Zero dimensions are raised to 1, so the smallest grid is a single cell.
    fn walled(rows: u32, cols: u32) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let n = (rows as usize) * (cols as usize);
        Self {
            rows,
            cols,
            cells: vec![W_ALL; n],
            root: Cell::new(0, 0),
            parent: vec![None; n],
            revision: 0,
        }
    }

    /// Uniform random perfect maze, rooted at `(0, 0)`.
    ///
    /// `rows` and `cols` should be at least 1; a zero side is treated as 1.
    /// Callers taking sizes from outside validate them first
    /// (see `SessionConfig::validate`).
    pub fn generate(rows: u32, cols: u32, seed: u64) -> Self {
        let mut grid = Self::walled(rows, cols);
        carve_wilson(&mut grid, seed);
        grid.orient();
        grid
    }

    /// Rebuild a grid from a persisted wall map, rooted at `root`.
    ///
    /// The map must describe a perfect maze: every passage open from both
    /// sides, a closed border, and exactly `n - 1` passages joining all cells.
    pub fn from_wall_map(map: &WallMap, root: Cell) -> Result<Self, GameError> {
        let n = (map.rows as usize) * (map.cols as usize);
        if map.rows == 0 || map.cols == 0 || map.walls.len() != n {
            return Err(GameError::InvalidConfig(format!(
                "wall map of {} cells does not fit {}x{}",
                map.walls.len(),
                map.rows,
                map.cols
            )));
        }
        let mut grid = Self::walled(map.rows, map.cols);
        grid.cells.copy_from_slice(&map.walls);
        grid.check_walls()?;
        grid.reroot(root)?;
        if !grid.is_spanning_tree() {
            return Err(GameError::InvalidConfig(format!(
                "wall map has {} passages over {} cells and is not a spanning tree",
                grid.passage_count(),
                grid.len()
            )));
        }
        Ok(grid)
    }

    fn check_walls(&self) -> Result<(), GameError> {
        for cell in self.cells() {
            for d in Direction::ALL {
                let consistent = match self.step(cell, d) {
                    Ok(nb) => self.is_open(cell, d) == self.is_open(nb, d.opposite()),
                    Err(_) => !self.is_open(cell, d),
                };
                if !consistent {
                    return Err(GameError::InvalidConfig(format!(
                        "wall map disagrees with itself at {cell} going {}",
                        d.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every cell walled in on all four sides.
    #[cfg(test)]
    pub(crate) fn sealed(rows: u32, cols: u32) -> Self {
        let mut grid = Self::walled(rows, cols);
        grid.orient();
        grid
    }

    /// Open arena: every interior passage open, only the border walled.
    /// Not a perfect maze, but the planner accepts any passable grid.
    pub fn arena(rows: u32, cols: u32) -> Self {
        let mut grid = Self::walled(rows, cols);
        for cell in grid.cells().collect::<Vec<_>>() {
            for d in [Direction::East, Direction::South] {
                grid.carve(cell, d);
            }
        }
        grid.orient();
        grid
    }

    pub fn wall_map(&self) -> WallMap {
        WallMap {
            rows: self.rows,
            cols: self.cols,
            walls: self.cells.clone(),
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn root(&self) -> Cell {
        self.root
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.rows && cell.col < self.cols
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.rows).flat_map(move |r| (0..self.cols).map(move |c| Cell::new(r, c)))
    }

    pub(crate) fn idx(&self, cell: Cell) -> usize {
        (cell.row as usize) * (self.cols as usize) + (cell.col as usize)
    }

    pub fn check_bounds(&self, cell: Cell) -> Result<(), GameError> {
        if self.contains(cell) {
            Ok(())
        } else {
            Err(self.out_of_bounds(cell.row as i64, cell.col as i64))
        }
    }

    fn out_of_bounds(&self, row: i64, col: i64) -> GameError {
        GameError::OutOfBounds {
            row,
            col,
            rows: self.rows,
            cols: self.cols,
        }
    }

    pub fn walls(&self, cell: Cell) -> u8 {
        // Out-of-bounds reads as fully walled.
        if !self.contains(cell) {
            return W_ALL;
        }
        self.cells[self.idx(cell)]
    }

    pub fn is_open(&self, cell: Cell, dir: Direction) -> bool {
        self.walls(cell) & dir.wall_bit() == 0
    }

    /// Cell one step in `dir`, whether or not a wall is in the way.
    pub fn step(&self, cell: Cell, dir: Direction) -> Result<Cell, GameError> {
        let (dr, dc) = dir.offset();
        let (r, c) = (cell.row as i64 + dr, cell.col as i64 + dc);
        if r < 0 || c < 0 || r >= self.rows as i64 || c >= self.cols as i64 {
            return Err(self.out_of_bounds(r, c));
        }
        Ok(Cell::new(r as u32, c as u32))
    }

    /// Neighbour through an open passage.
    pub fn neighbor(&self, cell: Cell, dir: Direction) -> Option<Cell> {
        if !self.is_open(cell, dir) {
            return None;
        }
        self.step(cell, dir).ok()
    }

    pub fn open_exits(&self, cell: Cell) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|d| self.is_open(cell, *d))
            .collect()
    }

    /// Open exits plus `Stay`.
    pub fn legal_moves(&self, cell: Cell) -> Vec<Move> {
        let mut moves: Vec<Move> = self.open_exits(cell).into_iter().map(Move::from).collect();
        moves.push(Move::Stay);
        moves
    }

    /// Number of open passages (each counted once).
    pub fn passage_count(&self) -> usize {
        self.cells()
            .map(|c| {
                usize::from(self.is_open(c, Direction::East))
                    + usize::from(self.is_open(c, Direction::South))
            })
            .sum()
    }

    /// Re-anchor the tree at `cell`. Walls are untouched; every previously
    /// computed path table becomes stale.
    pub fn reroot(&mut self, cell: Cell) -> Result<(), GameError> {
        self.check_bounds(cell)?;
        self.root = cell;
        self.orient();
        Ok(())
    }

    fn orient(&mut self) {
        self.parent.fill(None);
        self.revision = self.revision.wrapping_add(1);

        let mut seen = vec![false; self.cells.len()];
        let mut queue = VecDeque::new();
        seen[self.idx(self.root)] = true;
        queue.push_back(self.root);

        while let Some(cur) = queue.pop_front() {
            for d in Direction::ALL {
                if let Some(nb) = self.neighbor(cur, d) {
                    let i = self.idx(nb);
                    if !seen[i] {
                        seen[i] = true;
                        self.parent[i] = Some(cur);
                        queue.push_back(nb);
                    }
                }
            }
        }
    }

    /// Next cell toward the root (`None` at the root or when unreachable).
    pub fn parent(&self, cell: Cell) -> Option<Cell> {
        if !self.contains(cell) {
            return None;
        }
        self.parent[self.idx(cell)]
    }

    /// The tree path from `cell` to the root, both ends included.
    pub fn path_to_root(&self, cell: Cell) -> Option<Vec<Cell>> {
        if !self.contains(cell) {
            return None;
        }
        let mut path = vec![cell];
        let mut cur = cell;
        while cur != self.root {
            cur = self.parent(cur)?;
            path.push(cur);
            if path.len() > self.cells.len() {
                return None;
            }
        }
        Some(path)
    }

    /// Connected and acyclic: `n - 1` passages and every cell reaches the root.
    pub fn is_spanning_tree(&self) -> bool {
        self.passage_count() + 1 == self.cells.len()
            && self.cells().all(|c| self.path_to_root(c).is_some())
    }

    fn carve(&mut self, a: Cell, dir: Direction) -> Option<Cell> {
        let b = self.step(a, dir).ok()?;
        let (ia, ib) = (self.idx(a), self.idx(b));
        self.cells[ia] &= !dir.wall_bit();
        self.cells[ib] &= !dir.opposite().wall_bit();
        Some(b)
    }
}

/// Wilson's algorithm: loop-erased random walks from every cell not yet in
/// the tree. Produces each spanning tree with equal probability.
fn carve_wilson(grid: &mut Grid, seed: u64) {
    let n = grid.len();
    let mut rng = Prng::new(seed ^ 0xA5A5_5A5A_5A5A_A5A5);
    let mut in_tree = vec![false; n];
    // Last direction taken out of each cell during the current walk.
    let mut exit = vec![Direction::North; n];

    in_tree[rng.gen_range_usize(0, n)] = true;

    let all: Vec<Cell> = grid.cells().collect();
    for start in all {
        if in_tree[grid.idx(start)] {
            continue;
        }

        let mut cur = start;
        while !in_tree[grid.idx(cur)] {
            let mut options = [Direction::North; 4];
            let mut k = 0usize;
            for d in Direction::ALL {
                if grid.step(cur, d).is_ok() {
                    options[k] = d;
                    k += 1;
                }
            }
            if k == 0 {
                // 1x1 grid: nothing to walk to.
                break;
            }
            let d = options[rng.gen_range_usize(0, k)];
            let i = grid.idx(cur);
            exit[i] = d;
            if let Ok(next) = grid.step(cur, d) {
                cur = next;
            }
        }

        let mut cur = start;
        while !in_tree[grid.idx(cur)] {
            let i = grid.idx(cur);
            in_tree[i] = true;
            match grid.carve(cur, exit[i]) {
                Some(next) => cur = next,
                None => break,
            }
        }
    }
}
