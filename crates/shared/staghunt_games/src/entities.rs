use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::intent::TargetId;
use crate::maze::{Cell, Grid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    #[serde(rename = "h1")]
    Human,
    #[serde(rename = "h2")]
    Companion,
    #[serde(rename = "s1")]
    Stag,
    #[serde(rename = "r1")]
    Hare1,
    #[serde(rename = "r2")]
    Hare2,
}

impl EntityId {
    pub const ALL: [EntityId; 5] = [
        EntityId::Human,
        EntityId::Companion,
        EntityId::Stag,
        EntityId::Hare1,
        EntityId::Hare2,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            EntityId::Human => "h1",
            EntityId::Companion => "h2",
            EntityId::Stag => "s1",
            EntityId::Hare1 => "r1",
            EntityId::Hare2 => "r2",
        }
    }
}

/// Where every entity stands. The hares never move; the stag stays where
/// the layout put it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Positions {
    #[serde(rename = "r1")]
    pub hare1: Cell,
    #[serde(rename = "r2")]
    pub hare2: Cell,
    #[serde(rename = "s1")]
    pub stag: Cell,
    #[serde(rename = "h1")]
    pub human: Cell,
    #[serde(rename = "h2")]
    pub companion: Cell,
}

impl Default for Positions {
    fn default() -> Self {
        Self {
            hare1: Cell::new(1, 4),
            hare2: Cell::new(5, 1),
            stag: Cell::new(2, 5),
            human: Cell::new(2, 1),
            companion: Cell::new(1, 3),
        }
    }
}

impl Positions {
    pub fn get(&self, id: EntityId) -> Cell {
        match id {
            EntityId::Human => self.human,
            EntityId::Companion => self.companion,
            EntityId::Stag => self.stag,
            EntityId::Hare1 => self.hare1,
            EntityId::Hare2 => self.hare2,
        }
    }

    pub fn target(&self, t: TargetId) -> Cell {
        self.get(t.entity())
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, Cell)> + '_ {
        EntityId::ALL.into_iter().map(|id| (id, self.get(id)))
    }

    pub fn validate(&self, grid: &Grid) -> Result<(), GameError> {
        for (_, cell) in self.iter() {
            grid.check_bounds(cell)?;
        }
        Ok(())
    }

    /// The hare closest to `from` in a straight line; `r1` wins a tie.
    pub fn nearest_hare(&self, from: Cell) -> TargetId {
        if from.dist(self.hare2) < from.dist(self.hare1) {
            TargetId::Hare2
        } else {
            TargetId::Hare1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_serializes_with_short_tags() {
        let json = serde_json::to_value(Positions::default()).unwrap();
        assert_eq!(json["h1"], serde_json::json!([2, 1]));
        assert_eq!(json["h2"], serde_json::json!([1, 3]));
        assert_eq!(json["s1"], serde_json::json!([2, 5]));
        assert_eq!(json["r1"], serde_json::json!([1, 4]));
        assert_eq!(json["r2"], serde_json::json!([5, 1]));
    }

    #[test]
    fn nearest_hare_prefers_r1_on_ties() {
        let p = Positions {
            hare1: Cell::new(0, 2),
            hare2: Cell::new(2, 0),
            ..Positions::default()
        };
        assert_eq!(p.nearest_hare(Cell::new(0, 0)), TargetId::Hare1);
        assert_eq!(p.nearest_hare(Cell::new(2, 1)), TargetId::Hare2);
        // Default layout: companion at (1,3) is one step from r1.
        let d = Positions::default();
        assert_eq!(d.nearest_hare(d.companion), TargetId::Hare1);
    }

    #[test]
    fn layout_must_fit_the_grid() {
        let g = Grid::generate(4, 4, 1);
        assert!(matches!(
            Positions::default().validate(&g),
            Err(GameError::OutOfBounds { .. })
        ));
        assert!(Positions::default().validate(&Grid::generate(7, 7, 1)).is_ok());
    }
}
