//! Layout templates and the generators that produce them.
//!
//! A [`Generator`] is a hashable parameter set that draws a layout into a
//! [`TemplateBuilder`]. Generated layouts are frozen into [`Template`]s and
//! cached by the [`LayoutContext`](crate::context::LayoutContext), so requesting
//! the same parameters twice returns the same [`Master`].

use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use arcstr::ArcStr;
use geometry::prelude::*;
use indexmap::IndexMap;
use routing::{HalfInt, LayerId, WireArray};
use serde::{Deserialize, Serialize};

use crate::analog::rows::RowLayoutInfo;
use crate::error::{Error, Result};

mod builder;
mod instance;
mod route;

pub use builder::{PinOpts, TemplateBuilder};
pub use instance::{Instance, InstanceId};
pub use route::{MinLenMode, TrackConnect};

/// A parameter set that can generate a layout.
pub trait Generator: Debug + Clone + Hash + Eq + Send + Sync + 'static {
    /// Extra information returned to parents along with the layout.
    type Data: Debug + Send + Sync + 'static;

    /// The base name of generated cells.
    fn name(&self) -> ArcStr;

    /// Draws the layout.
    fn generate(&self, b: &mut TemplateBuilder) -> Result<Self::Data>;
}

/// A generated template together with its parameters and data.
#[derive(Debug)]
pub struct Master<G: Generator> {
    params: G,
    template: Arc<Template>,
    data: G::Data,
}

impl<G: Generator> Master<G> {
    pub(crate) fn new(params: G, template: Arc<Template>, data: G::Data) -> Self {
        Self {
            params,
            template,
            data,
        }
    }

    /// The parameters this master was generated from.
    #[inline]
    pub fn params(&self) -> &G {
        &self.params
    }

    /// The frozen layout.
    #[inline]
    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    /// The data returned by the generator.
    #[inline]
    pub fn data(&self) -> &G::Data {
        &self.data
    }
}

impl<G: Generator> Deref for Master<G> {
    type Target = Template;

    fn deref(&self) -> &Self::Target {
        &self.template
    }
}

/// A pin shape of a port.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    /// The pin geometry.
    pub warr: WireArray,
    /// The label drawn on the pin.
    pub label: ArcStr,
    /// Whether the label is visible.
    pub show: bool,
}

/// A named collection of pins.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pins: Vec<Pin>,
}

impl Port {
    /// The pins of the port.
    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub(crate) fn push(&mut self, pin: Pin) {
        self.pins.push(pin);
    }
}

/// A via between two adjacent layers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Via {
    /// The lower of the two layers.
    pub bot_layer: LayerId,
    /// The track on the lower layer.
    pub bot_track: HalfInt,
    /// The track on the upper layer.
    pub top_track: HalfInt,
    /// The center of the via.
    pub loc: Point,
}

/// An area on one layer that later routes must avoid.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Blockage {
    /// The blocked layer.
    pub layer: LayerId,
    /// The blocked area.
    pub rect: Rect,
    /// What created the blockage.
    pub owner: ArcStr,
}

/// A frozen layout.
#[derive(Debug, Clone)]
pub struct Template {
    pub(crate) name: ArcStr,
    pub(crate) top_layer: LayerId,
    pub(crate) bound_box: Rect,
    pub(crate) array_box: Rect,
    pub(crate) fill_box: Rect,
    pub(crate) row_layout_info: Option<RowLayoutInfo>,
    pub(crate) sch_params: serde_yaml::Value,
    pub(crate) ports: IndexMap<ArcStr, Port>,
    pub(crate) wires: Vec<WireArray>,
    pub(crate) vias: Vec<Via>,
    pub(crate) instances: Vec<Instance>,
    pub(crate) blockages: Vec<Blockage>,
}

impl Template {
    /// The cell name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The highest layer the template routes on.
    pub fn top_layer(&self) -> LayerId {
        self.top_layer
    }

    /// The bounding box, a multiple of the top layer block size.
    pub fn bound_box(&self) -> Rect {
        self.bound_box
    }

    /// The box used to abut the template against its neighbors.
    pub fn array_box(&self) -> Rect {
        self.array_box
    }

    /// The box available for power fill.
    pub fn fill_box(&self) -> Rect {
        self.fill_box
    }

    /// The row stack of transistor templates.
    pub fn row_layout_info(&self) -> Option<&RowLayoutInfo> {
        self.row_layout_info.as_ref()
    }

    /// Parameters for the matching schematic.
    pub fn sch_params(&self) -> &serde_yaml::Value {
        &self.sch_params
    }

    /// Whether a port named `name` exists.
    pub fn has_port(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    /// Looks up a port by name.
    pub fn get_port(&self, name: &str) -> Result<&Port> {
        self.ports
            .get(name)
            .ok_or_else(|| Error::UnknownPort(ArcStr::from(name)))
    }

    /// Iterates over the pin wires of a port, optionally only those on `layer`.
    pub fn port_pins_iter(
        &self,
        name: &str,
        layer: Option<LayerId>,
    ) -> Result<impl Iterator<Item = &WireArray>> {
        Ok(self
            .get_port(name)?
            .pins()
            .iter()
            .map(|pin| &pin.warr)
            .filter(move |warr| layer.map_or(true, |l| warr.layer() == l)))
    }

    /// The port names, in the order the ports were created.
    pub fn port_names(&self) -> impl Iterator<Item = &ArcStr> {
        self.ports.keys()
    }

    /// All drawn wires, excluding those of instances.
    pub fn wires(&self) -> &[WireArray] {
        &self.wires
    }

    /// All drawn vias, excluding those of instances.
    pub fn vias(&self) -> &[Via] {
        &self.vias
    }

    /// The child instances.
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// The routing blockages.
    pub fn blockages(&self) -> &[Blockage] {
        &self.blockages
    }
}
