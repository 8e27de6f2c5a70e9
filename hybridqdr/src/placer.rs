//! Relative placement of templates.
//!
//! Instances are placed by abutting their array box against a side of an
//! already placed reference instance, or at the origin if there is no
//! reference. Every resulting origin lies on a placement grid.

use std::sync::Arc;

use arcstr::ArcStr;
use geometry::prelude::*;
use routing::{LayerId, RoutingGrid};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::template::{InstanceId, Template, TemplateBuilder};

/// The unit lattice that placed origins and array box sizes must lie on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PlacementGrid {
    /// The horizontal unit.
    pub x: i64,
    /// The vertical unit.
    pub y: i64,
}

impl PlacementGrid {
    /// The block grid of templates whose top layer is `top_layer`.
    pub fn for_layer(grid: &RoutingGrid, top_layer: LayerId) -> Result<Self> {
        let (x, y) = grid.get_block_size(top_layer)?;
        Ok(Self { x, y })
    }
}

/// A placement recorded by [`TemplateBuilder::relplace`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PlacementEdge {
    /// The placed instance.
    pub child: InstanceId,
    /// The instance it was abutted against.
    pub reference: Option<InstanceId>,
    /// The side of the reference the child was placed on.
    pub side: Side,
    /// The extra offset, in placement grid units.
    pub shift: (i64, i64),
}

/// How to place an instance relative to another.
#[derive(Debug, Copy, Clone)]
pub struct RelPlace {
    orient: Orientation,
    grid: Option<PlacementGrid>,
    reference: Option<InstanceId>,
    side: Side,
    shift: (i64, i64),
}

impl RelPlace {
    /// Places the lower left corner of the array box at the origin.
    pub fn origin() -> Self {
        Self {
            orient: Orientation::R0,
            grid: None,
            reference: None,
            side: Side::Right,
            shift: (0, 0),
        }
    }

    /// Abuts the array box against `side` of `reference`, aligned to its
    /// lower or left edge.
    pub fn beside(reference: InstanceId, side: Side) -> Self {
        Self {
            reference: Some(reference),
            side,
            ..Self::origin()
        }
    }

    /// Sets the orientation of the placed master.
    pub fn orient(mut self, orient: Orientation) -> Self {
        self.orient = orient;
        self
    }

    /// Shifts the placement by a number of grid units.
    pub fn shift(mut self, dx: i64, dy: i64) -> Self {
        self.shift = (dx, dy);
        self
    }

    /// Uses `grid` instead of the block grid of the master's top layer.
    pub fn grid(mut self, grid: PlacementGrid) -> Self {
        self.grid = Some(grid);
        self
    }
}

impl TemplateBuilder {
    /// Places `master` according to `place`.
    ///
    /// Fails with [`Error::Placement`] if the master's array box is not a
    /// multiple of the placement grid or the resulting origin is off grid, and
    /// with [`Error::CellOverlap`] if it overlaps an existing instance.
    pub fn relplace(
        &mut self,
        master: &Arc<Template>,
        name: impl Into<ArcStr>,
        place: RelPlace,
    ) -> Result<InstanceId> {
        let name = name.into();
        let pg = match place.grid {
            Some(pg) => pg,
            None => PlacementGrid::for_layer(self.grid(), master.top_layer())?,
        };
        let abox = master.array_box();
        if abox.width() % pg.x != 0 || abox.height() % pg.y != 0 {
            return Err(Error::placement(format!(
                "array box of `{}` ({} x {}) is not a multiple of the {} x {} placement grid",
                master.name(),
                abox.width(),
                abox.height(),
                pg.x,
                pg.y
            )));
        }

        let target = match place.reference {
            None => Point::zero(),
            Some(r) => {
                let rbox = self.instance(r)?.array_box();
                match place.side {
                    Side::Right => Point::new(rbox.right(), rbox.bot()),
                    Side::Left => Point::new(rbox.left() - abox.width(), rbox.bot()),
                    Side::Top => Point::new(rbox.left(), rbox.top()),
                    Side::Bot => Point::new(rbox.left(), rbox.bot() - abox.height()),
                }
            }
        };
        let target = target.translate(place.shift.0 * pg.x, place.shift.1 * pg.y);
        let oriented = Transformation::from_offset_and_orientation(Point::zero(), place.orient)
            .apply_rect(abox);
        let loc = target - oriented.lower_left();
        if loc.x % pg.x != 0 || loc.y % pg.y != 0 {
            return Err(Error::placement(format!(
                "origin ({}, {}) of `{name}` is not on the {} x {} placement grid",
                loc.x, loc.y, pg.x, pg.y
            )));
        }

        let id = self.add_instance(master, name.clone(), loc, place.orient)?;
        self.edges.push(PlacementEdge {
            child: id,
            reference: place.reference,
            side: place.side,
            shift: place.shift,
        });
        debug!(%name, ?loc, orient = ?place.orient, "placed instance");
        Ok(id)
    }
}
