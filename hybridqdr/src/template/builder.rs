//! Mutable layouts under construction.

use std::sync::Arc;

use arcstr::ArcStr;
use geometry::prelude::*;
use indexmap::IndexMap;
use num::integer::{div_ceil, div_floor};
use routing::{HalfInt, LayerId, RoutingGrid, TrackId, WireArray};
use serde::Serialize;
use tracing::trace;

use crate::analog::rows::RowLayoutInfo;
use crate::context::LayoutContext;
use crate::error::{Error, Result};
use crate::placer::PlacementEdge;
use crate::tech::MosTech;
use crate::template::{Blockage, Instance, InstanceId, Pin, Port, Template, Via};

/// Options for [`TemplateBuilder::add_pin_with`].
#[derive(Debug, Clone, Default)]
pub struct PinOpts {
    /// The label, if different from the port name.
    pub label: Option<ArcStr>,
    /// Whether the label is visible. Defaults to visible.
    pub hide: bool,
    /// Restricts the pin shape to the lower end (`-1`) or upper end (`1`) of
    /// the wire. `0` uses the whole wire.
    pub edge_mode: i32,
}

/// A layout under construction.
pub struct TemplateBuilder {
    ctx: LayoutContext,
    grid: Arc<RoutingGrid>,
    name: ArcStr,
    top_layer: Option<LayerId>,
    bound_box: Option<Rect>,
    array_box: Option<Rect>,
    fill_box: Option<Rect>,
    row_layout_info: Option<RowLayoutInfo>,
    sch_params: serde_yaml::Value,
    pub(crate) instances: Vec<Instance>,
    pub(crate) edges: Vec<PlacementEdge>,
    pub(crate) wires: Vec<WireArray>,
    pub(crate) vias: Vec<Via>,
    ports: IndexMap<ArcStr, Port>,
    nets: IndexMap<ArcStr, Vec<WireArray>>,
    blockages: Vec<Blockage>,
}

impl TemplateBuilder {
    pub(crate) fn new(ctx: LayoutContext, name: ArcStr) -> Self {
        let grid = ctx.grid_arc();
        Self {
            ctx,
            grid,
            name,
            top_layer: None,
            bound_box: None,
            array_box: None,
            fill_box: None,
            row_layout_info: None,
            sch_params: serde_yaml::Value::Null,
            instances: Vec::new(),
            edges: Vec::new(),
            wires: Vec::new(),
            vias: Vec::new(),
            ports: IndexMap::new(),
            nets: IndexMap::new(),
            blockages: Vec::new(),
        }
    }

    /// The context this template is generated in.
    #[inline]
    pub fn ctx(&self) -> &LayoutContext {
        &self.ctx
    }

    /// The routing grid.
    #[inline]
    pub fn grid(&self) -> &RoutingGrid {
        &self.grid
    }

    /// A shared handle to the routing grid.
    #[inline]
    pub fn grid_arc(&self) -> Arc<RoutingGrid> {
        self.grid.clone()
    }

    /// The transistor row technology.
    #[inline]
    pub fn tech(&self) -> &MosTech {
        self.ctx.tech()
    }

    /// The cell name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The top layer, once the size has been set.
    pub fn top_layer(&self) -> Option<LayerId> {
        self.top_layer
    }

    /// The bounding box, once the size has been set.
    pub fn bound_box(&self) -> Option<Rect> {
        self.bound_box
    }

    /// The array box, once the size has been set.
    pub fn array_box(&self) -> Option<Rect> {
        self.array_box.or(self.bound_box)
    }

    /// Sets the top layer and rounds `bbox` outward to the block grid of that layer.
    ///
    /// The rounded box becomes both the bounding box and, unless one was set
    /// explicitly, the array box.
    pub fn set_size_from_bound_box(&mut self, top_layer: LayerId, bbox: Rect) -> Result<Rect> {
        let (bw, bh) = self.grid.get_block_size(top_layer)?;
        let rounded = Rect::from_sides(
            div_floor(bbox.left(), bw) * bw,
            div_floor(bbox.bot(), bh) * bh,
            div_ceil(bbox.right(), bw) * bw,
            div_ceil(bbox.top(), bh) * bh,
        );
        trace!(top_layer, ?bbox, ?rounded, "set template size");
        self.top_layer = Some(top_layer);
        self.bound_box = Some(rounded);
        Ok(rounded)
    }

    /// Sets the box used to abut this template against its neighbors.
    pub fn set_array_box(&mut self, rect: Rect) {
        self.array_box = Some(rect);
    }

    /// Marks the region available for power fill.
    pub fn add_cell_boundary(&mut self, rect: Rect) {
        self.fill_box = Some(rect);
    }

    /// Publishes the row stack of a transistor template.
    pub fn set_row_layout_info(&mut self, info: RowLayoutInfo) {
        self.row_layout_info = Some(info);
    }

    /// Records parameters for the matching schematic.
    pub fn set_sch_params<T: Serialize>(&mut self, params: &T) -> Result<()> {
        self.sch_params = serde_yaml::to_value(params)?;
        Ok(())
    }

    /// Places `master` with its origin at `loc`.
    ///
    /// Fails with [`Error::CellOverlap`] if its array box overlaps that of an
    /// existing instance.
    pub fn add_instance(
        &mut self,
        master: &Arc<Template>,
        name: impl Into<ArcStr>,
        loc: Point,
        orient: Orientation,
    ) -> Result<InstanceId> {
        let inst = Instance::new(
            name.into(),
            master.clone(),
            Transformation::from_offset_and_orientation(loc, orient),
        );
        let abox = inst.array_box();
        if let Some(other) = self.instances.iter().find(|i| i.array_box().overlaps(&abox)) {
            return Err(Error::CellOverlap {
                new: inst.name().clone(),
                existing: other.name().clone(),
            });
        }
        trace!(name = %inst.name(), ?loc, ?orient, "added instance");
        self.instances.push(inst);
        Ok(InstanceId(self.instances.len() - 1))
    }

    /// Looks up an instance.
    pub fn instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances
            .get(id.0)
            .ok_or_else(|| Error::invariant(format!("no instance with index {}", id.0)))
    }

    /// The pin wires of an instance port, in this template's coordinates.
    pub fn inst_pins(&self, id: InstanceId, port: &str) -> Result<Vec<WireArray>> {
        self.instance(id)?.port_pins(&self.grid, port, None)
    }

    /// The first pin wire of an instance port, in this template's coordinates.
    pub fn inst_pin(&self, id: InstanceId, port: &str) -> Result<WireArray> {
        self.instance(id)?.get_pin(&self.grid, port)
    }

    /// Draws wires on `num` tracks of `layer` starting at `idx`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_wires(
        &mut self,
        layer: LayerId,
        idx: HalfInt,
        lower: i64,
        upper: i64,
        width: u32,
        num: u32,
        pitch: HalfInt,
    ) -> Result<WireArray> {
        self.grid.get_wire_width(layer, width)?;
        let warr = WireArray::new(TrackId::bus(layer, idx, width, num, pitch), lower, upper);
        self.wires.push(warr);
        Ok(warr)
    }

    pub(crate) fn push_wire(&mut self, warr: WireArray) {
        if !self.wires.contains(&warr) {
            self.wires.push(warr);
        }
    }

    /// Adds a pin covering `warr` to port `name`.
    pub fn add_pin(&mut self, name: impl Into<ArcStr>, warr: WireArray) -> Result<()> {
        self.add_pin_with(name, warr, PinOpts::default())
    }

    /// Adds a pin to port `name` with the given options.
    pub fn add_pin_with(
        &mut self,
        name: impl Into<ArcStr>,
        warr: WireArray,
        opts: PinOpts,
    ) -> Result<()> {
        let name = name.into();
        let warr = if opts.edge_mode == 0 {
            warr
        } else {
            let len = self
                .grid
                .get_min_length(warr.layer(), warr.track_id().width())?
                .min(warr.length());
            let span = if opts.edge_mode < 0 {
                Span::new(warr.lower(), warr.lower() + len)
            } else {
                Span::new(warr.upper() - len, warr.upper())
            };
            warr.with_span(span)
        };
        let label = opts.label.unwrap_or_else(|| name.clone());
        self.ports.entry(name).or_default().push(Pin {
            warr,
            label,
            show: !opts.hide,
        });
        Ok(())
    }

    /// Whether a port named `name` exists.
    pub fn has_port(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    /// All pin wires of port `name`, optionally only those on `layer`.
    pub fn get_all_port_pins(&self, name: &str, layer: Option<LayerId>) -> Result<Vec<WireArray>> {
        let port = self
            .ports
            .get(name)
            .ok_or_else(|| Error::UnknownPort(ArcStr::from(name)))?;
        Ok(port
            .pins()
            .iter()
            .map(|pin| pin.warr)
            .filter(|warr| layer.map_or(true, |l| warr.layer() == l))
            .collect())
    }

    /// The first pin wire of port `name`.
    pub fn get_pin(&self, name: &str) -> Result<WireArray> {
        self.get_all_port_pins(name, None)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnknownPort(ArcStr::from(name)))
    }

    /// Exports every pin of an instance port under `new_name`, or under the
    /// same name if `new_name` is `None`.
    pub fn reexport(
        &mut self,
        inst: InstanceId,
        port: &str,
        new_name: Option<&str>,
    ) -> Result<()> {
        let name = ArcStr::from(new_name.unwrap_or(port));
        for warr in self.inst_pins(inst, port)? {
            self.add_pin(name.clone(), warr)?;
        }
        Ok(())
    }

    /// Like [`TemplateBuilder::reexport`], but does nothing if the instance
    /// has no port named `port`.
    ///
    /// Returns whether the port was exported.
    pub fn reexport_if_present(
        &mut self,
        inst: InstanceId,
        port: &str,
        new_name: Option<&str>,
    ) -> Result<bool> {
        if !self.instance(inst)?.has_port(port) {
            return Ok(false);
        }
        self.reexport(inst, port, new_name)?;
        Ok(true)
    }

    /// Records that `warr` carries net `name`.
    pub fn add_net(&mut self, name: impl Into<ArcStr>, warr: WireArray) {
        self.nets.entry(name.into()).or_default().push(warr);
    }

    /// The wires recorded for net `name`.
    pub fn net(&self, name: &str) -> Result<&[WireArray]> {
        self.nets
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| Error::UnknownNet(ArcStr::from(name)))
    }

    /// Whether any wire was recorded for net `name`.
    pub fn has_net(&self, name: &str) -> bool {
        self.nets.contains_key(name)
    }

    /// Fails with [`Error::BlockageCollision`] if `rect` overlaps a blockage on `layer`.
    pub fn check_blockage(&self, layer: LayerId, rect: Rect, what: &str) -> Result<()> {
        if let Some(b) = self
            .blockages
            .iter()
            .find(|b| b.layer == layer && b.rect.overlaps(&rect))
        {
            trace!(layer, owner = %b.owner, ?rect, "blockage collision");
            return Err(Error::BlockageCollision {
                layer,
                what: ArcStr::from(what),
            });
        }
        Ok(())
    }

    /// Reserves `rect` on `layer`.
    pub fn add_blockage(&mut self, layer: LayerId, rect: Rect, owner: impl Into<ArcStr>) {
        self.blockages.push(Blockage {
            layer,
            rect,
            owner: owner.into(),
        });
    }

    /// The blockages added so far.
    pub fn blockages(&self) -> &[Blockage] {
        &self.blockages
    }

    /// The placement relations recorded so far.
    pub fn edges(&self) -> &[PlacementEdge] {
        &self.edges
    }

    /// The wires drawn so far.
    pub fn wires(&self) -> &[WireArray] {
        &self.wires
    }

    /// The vias drawn so far.
    pub fn vias(&self) -> &[Via] {
        &self.vias
    }

    pub(crate) fn finish(self) -> Result<Template> {
        let (Some(top_layer), Some(bound_box)) = (self.top_layer, self.bound_box) else {
            return Err(Error::invariant(format!(
                "template `{}` was never given a size",
                self.name
            )));
        };
        Ok(Template {
            name: self.name,
            top_layer,
            bound_box,
            array_box: self.array_box.unwrap_or(bound_box),
            fill_box: self.fill_box.unwrap_or(bound_box),
            row_layout_info: self.row_layout_info,
            sch_params: self.sch_params,
            ports: self.ports,
            wires: self.wires,
            vias: self.vias,
            instances: self.instances,
            blockages: self.blockages,
        })
    }
}
