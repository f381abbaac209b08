//! ASCII rendering of the maze for the terminal front end.

use staghunt_games::entities::{EntityId, Positions};
use staghunt_games::maze::{Cell, Direction, Grid};

fn glyph(id: EntityId) -> char {
    match id {
        EntityId::Human => 'H',
        EntityId::Companion => 'C',
        EntityId::Stag => 'S',
        EntityId::Hare1 | EntityId::Hare2 => 'r',
    }
}

fn occupant(positions: &Positions, cell: Cell) -> char {
    let mut here = positions.iter().filter(|(_, at)| *at == cell);
    match (here.next(), here.next()) {
        (None, _) => ' ',
        (Some((id, _)), None) => glyph(id),
        (Some(_), Some(_)) => '*',
    }
}

/// Draws walls with `+`, `-` and `|`; each cell is three columns wide.
/// `H` human, `C` companion, `S` stag, `r` hare, `*` more than one.
pub fn render(grid: &Grid, positions: &Positions) -> String {
    let mut out = String::new();
    for r in 0..grid.rows() {
        for c in 0..grid.cols() {
            out.push('+');
            let open = grid.is_open(Cell::new(r, c), Direction::North);
            out.push_str(if open { "   " } else { "---" });
        }
        out.push_str("+\n");

        for c in 0..grid.cols() {
            let cell = Cell::new(r, c);
            out.push(if grid.is_open(cell, Direction::West) { ' ' } else { '|' });
            out.push(' ');
            out.push(occupant(positions, cell));
            out.push(' ');
        }
        let last = Cell::new(r, grid.cols() - 1);
        out.push(if grid.is_open(last, Direction::East) { ' ' } else { '|' });
        out.push('\n');
    }
    for c in 0..grid.cols() {
        out.push('+');
        let open = grid.is_open(Cell::new(grid.rows() - 1, c), Direction::South);
        out.push_str(if open { "   " } else { "---" });
    }
    out.push_str("+\n");
    out
}
