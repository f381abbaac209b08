//! A* over the maze toward the grid's current root.
//!
//! The planner never takes a goal argument: it always searches toward
//! [`Grid::root`]. Retargeting happens by rerooting the grid.
//!
//! Frontier order is `(f, h, cell)`, smallest first: lowest `g + h`, then the
//! cell the heuristic puts closest to the root, then the smallest
//! `(row, col)`. Neighbours are expanded east, south, north, west. With a
//! unit-cost grid and the Manhattan heuristic this ordering is fully
//! deterministic and the route returned is cost-optimal.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::HashMap;

use crate::error::GameError;
use crate::maze::{Cell, Direction, Grid};

pub const SEARCH_ORDER: [Direction; 4] = [
    Direction::East,
    Direction::South,
    Direction::North,
    Direction::West,
];

/// Computes optimal routes toward the grid's root.
pub trait PathPlanner {
    fn find_paths(&mut self, grid: &Grid, start: Cell) -> Result<PathTable, GameError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AStar;

impl PathPlanner for AStar {
    fn find_paths(&mut self, grid: &Grid, start: Cell) -> Result<PathTable, GameError> {
        find_paths(grid, start)
    }
}

/// Forward table along one optimal route: each cell maps to the next cell
/// toward the root it was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTable {
    start: Cell,
    root: Cell,
    revision: u64,
    next: HashMap<Cell, Cell>,
}

impl PathTable {
    pub fn start(&self) -> Cell {
        self.start
    }

    pub fn root(&self) -> Cell {
        self.root
    }

    /// Grid revision the table was computed against.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Route length in steps.
    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    /// Raw table lookup.
    pub fn next_from(&self, cell: Cell) -> Option<Cell> {
        self.next.get(&cell).copied()
    }

    pub fn is_current(&self, grid: &Grid) -> bool {
        grid.revision() == self.revision && grid.root() == self.root
    }

    /// The single next step from `cell`, or `None` when `cell` is the root.
    ///
    /// Fails with [`GameError::NoPath`] if the grid was rerooted since the
    /// table was built or `cell` is not on the route.
    pub fn next_step(&self, grid: &Grid, cell: Cell) -> Result<Option<Cell>, GameError> {
        let no_path = GameError::NoPath {
            from: cell,
            root: grid.root(),
        };
        if !self.is_current(grid) {
            return Err(no_path);
        }
        if cell == self.root {
            return Ok(None);
        }
        self.next_from(cell).map(Some).ok_or(no_path)
    }

    /// Cells from start to root inclusive.
    pub fn route(&self) -> Vec<Cell> {
        let mut out = vec![self.start];
        let mut cur = self.start;
        while let Some(n) = self.next_from(cur) {
            out.push(n);
            cur = n;
            if out.len() > self.next.len() + 1 {
                break;
            }
        }
        out
    }
}

/// A* from `start` to the grid's root.
pub fn find_paths(grid: &Grid, start: Cell) -> Result<PathTable, GameError> {
    grid.check_bounds(start)?;
    let root = grid.root();
    let n = grid.len();

    let mut g_score = vec![u32::MAX; n];
    let mut f_score = vec![u32::MAX; n];
    let mut came_from: Vec<Option<Cell>> = vec![None; n];
    let mut closed = vec![false; n];

    let h0 = start.manhattan(root);
    g_score[grid.idx(start)] = 0;
    f_score[grid.idx(start)] = h0;

    let mut open = BinaryHeap::new();
    open.push(Reverse((h0, h0, start)));

    let mut reached = false;
    while let Some(Reverse((f, _, cur))) = open.pop() {
        if cur == root {
            reached = true;
            break;
        }
        let ci = grid.idx(cur);
        // Stale heap entry.
        if closed[ci] || f > f_score[ci] {
            continue;
        }
        closed[ci] = true;

        for d in SEARCH_ORDER {
            let Some(child) = grid.neighbor(cur, d) else {
                continue;
            };
            let ki = grid.idx(child);
            let g = g_score[ci] + 1;
            let h = child.manhattan(root);
            if g + h < f_score[ki] {
                g_score[ki] = g;
                f_score[ki] = g + h;
                came_from[ki] = Some(cur);
                open.push(Reverse((g + h, h, child)));
            }
        }
    }

    if !reached {
        return Err(GameError::NoPath { from: start, root });
    }

    let mut next = HashMap::new();
    let mut cur = root;
    while cur != start {
        let prev = came_from[grid.idx(cur)].ok_or(GameError::NoPath { from: start, root })?;
        next.insert(prev, cur);
        cur = prev;
    }

    Ok(PathTable {
        start,
        root,
        revision: grid.revision(),
        next,
    })
}
