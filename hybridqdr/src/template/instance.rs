//! Placed templates.

use std::sync::Arc;

use arcstr::ArcStr;
use geometry::prelude::*;
use routing::{HalfInt, LayerId, RoutingGrid, WireArray};

use crate::error::{Error, Result};
use crate::template::Template;

/// The index of an instance within its parent builder.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct InstanceId(pub(crate) usize);

/// A template placed in a parent template.
#[derive(Debug, Clone)]
pub struct Instance {
    name: ArcStr,
    master: Arc<Template>,
    transform: Transformation,
}

impl Instance {
    pub(crate) fn new(name: ArcStr, master: Arc<Template>, transform: Transformation) -> Self {
        Self {
            name,
            master,
            transform,
        }
    }

    /// The instance name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The placed template.
    pub fn master(&self) -> &Arc<Template> {
        &self.master
    }

    /// The transformation from master to parent coordinates.
    pub fn transform(&self) -> Transformation {
        self.transform
    }

    /// The orientation of the master.
    pub fn orientation(&self) -> Orientation {
        self.transform.orientation()
    }

    /// The bounding box in parent coordinates.
    pub fn bound_box(&self) -> Rect {
        self.transform.apply_rect(self.master.bound_box())
    }

    /// The array box in parent coordinates.
    pub fn array_box(&self) -> Rect {
        self.transform.apply_rect(self.master.array_box())
    }

    /// Whether the master has a port named `name`.
    pub fn has_port(&self, name: &str) -> bool {
        self.master.has_port(name)
    }

    /// The pin wires of port `name` in parent coordinates.
    pub fn port_pins(
        &self,
        grid: &RoutingGrid,
        name: &str,
        layer: Option<LayerId>,
    ) -> Result<Vec<WireArray>> {
        self.master
            .port_pins_iter(name, layer)?
            .map(|warr| Ok(warr.transform(grid, &self.transform)?))
            .collect()
    }

    /// The first pin wire of port `name` in parent coordinates.
    pub fn get_pin(&self, grid: &RoutingGrid, name: &str) -> Result<WireArray> {
        self.port_pins(grid, name, None)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnknownPort(ArcStr::from(name)))
    }

    /// The parent track that master track `idx` on `layer` lands on.
    pub fn translate_master_track(
        &self,
        grid: &RoutingGrid,
        layer: LayerId,
        idx: HalfInt,
    ) -> Result<HalfInt> {
        Ok(grid.transform_track(layer, idx, &self.transform)?)
    }

    /// A master coordinate along `dir` in parent coordinates.
    pub fn translate_master_coord(&self, coord: i64, dir: Dir) -> i64 {
        self.transform.apply_coord(coord, dir)
    }
}
