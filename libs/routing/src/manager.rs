//! Typed track allocation.
//!
//! A [`TrackManager`] maps wire types (`"sig"`, `"clk"`, `"sup"`, ...) to widths and
//! spacings on each layer and packs sequences of typed wires onto tracks. All
//! spacings are measured in empty tracks between the nearest wire edges.
use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{GridError, Result};
use crate::grid::{LayerId, RoutingGrid};
use crate::half_int::HalfInt;

/// A wire type, or an explicit wire width in tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackType {
    /// A wire of the given width with default spacing rules.
    Width(u32),
    /// A named wire type looked up in the [`TrackTables`].
    Named(ArcStr),
}

impl TrackType {
    /// The name of the wire type, if it has one.
    pub fn name(&self) -> Option<&ArcStr> {
        match self {
            Self::Named(name) => Some(name),
            Self::Width(_) => None,
        }
    }
}

impl Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Width(w) => write!(f, "width {w}"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for TrackType {
    fn from(value: &str) -> Self {
        Self::Named(ArcStr::from(value))
    }
}

impl From<ArcStr> for TrackType {
    fn from(value: ArcStr) -> Self {
        Self::Named(value)
    }
}

impl From<&ArcStr> for TrackType {
    fn from(value: &ArcStr) -> Self {
        Self::Named(value.clone())
    }
}

impl From<u32> for TrackType {
    fn from(value: u32) -> Self {
        Self::Width(value)
    }
}

/// Per-layer widths and spacings of named wire types.
///
/// Spacing entries are keyed either by a single type name, giving the space
/// between that type and any other wire, or by a pair written `"a:b"`, giving
/// the space between wires of type `a` and `b` in either order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTables {
    /// Wire widths in tracks, keyed by type and layer.
    #[serde(default)]
    pub widths: IndexMap<ArcStr, IndexMap<LayerId, u32>>,
    /// Wire spacings in tracks, keyed by type (or type pair) and layer.
    #[serde(default)]
    pub spaces: IndexMap<ArcStr, IndexMap<LayerId, HalfInt>>,
}

impl Hash for TrackTables {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (name, layers) in self.widths.iter() {
            name.hash(state);
            layers.iter().for_each(|entry| entry.hash(state));
        }
        for (name, layers) in self.spaces.iter() {
            name.hash(state);
            layers.iter().for_each(|entry| entry.hash(state));
        }
    }
}

impl TrackTables {
    /// Creates a new set of track tables.
    pub fn new(
        widths: IndexMap<ArcStr, IndexMap<LayerId, u32>>,
        spaces: IndexMap<ArcStr, IndexMap<LayerId, HalfInt>>,
    ) -> Self {
        Self { widths, spaces }
    }

    /// Sets the width of `name` wires on `layer`.
    pub fn with_width(mut self, name: impl Into<ArcStr>, layer: LayerId, width: u32) -> Self {
        self.widths
            .entry(name.into())
            .or_default()
            .insert(layer, width);
        self
    }

    /// Sets the spacing of `name` wires (or an `"a:b"` pair) on `layer`.
    pub fn with_space(mut self, name: impl Into<ArcStr>, layer: LayerId, space: HalfInt) -> Self {
        self.spaces
            .entry(name.into())
            .or_default()
            .insert(layer, space);
        self
    }

    fn width(&self, name: &str, layer: LayerId) -> Option<u32> {
        self.widths.get(name)?.get(&layer).copied()
    }

    fn space(&self, name: &str, layer: LayerId) -> Option<HalfInt> {
        self.spaces.get(name)?.get(&layer).copied()
    }

    fn pair_space(&self, a: &str, b: &str, layer: LayerId) -> Option<HalfInt> {
        self.space(&format!("{a}:{b}"), layer)
            .or_else(|| self.space(&format!("{b}:{a}"), layer))
    }
}

/// How wires are positioned in a slot that is larger than they need.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub enum Alignment {
    /// Pack wires against the lower end of the slot.
    Lower,
    /// Center the wires, spreading spacings evenly.
    #[default]
    Center,
    /// Pack wires against the upper end of the slot.
    Upper,
}

impl Alignment {
    /// The alignment corresponding to `-1`, `0` or `1`.
    pub fn from_sign(alignment: i32) -> Self {
        match alignment.cmp(&0) {
            Ordering::Less => Self::Lower,
            Ordering::Equal => Self::Center,
            Ordering::Greater => Self::Upper,
        }
    }
}

/// A forced spacing between two wire types.
pub type SpaceOverride = (TrackType, TrackType, HalfInt);

/// Allocates tracks to typed wires.
#[derive(Debug, Clone)]
pub struct TrackManager {
    grid: Arc<RoutingGrid>,
    tables: TrackTables,
    half_space: bool,
}

impl TrackManager {
    /// Creates a new [`TrackManager`].
    ///
    /// If `half_space` is set, spacings may be a half track and wires may be
    /// placed on half-integer tracks.
    pub fn new(grid: Arc<RoutingGrid>, tables: TrackTables, half_space: bool) -> Self {
        Self {
            grid,
            tables,
            half_space,
        }
    }

    /// The underlying routing grid.
    pub fn grid(&self) -> &RoutingGrid {
        &self.grid
    }

    /// The width and spacing tables.
    pub fn tables(&self) -> &TrackTables {
        &self.tables
    }

    /// Whether half-track spacings are allowed.
    pub fn half_space(&self) -> bool {
        self.half_space
    }

    /// The width of `ty` wires on `layer`, in tracks.
    ///
    /// Unknown types are one track wide.
    pub fn get_width(&self, layer: LayerId, ty: &TrackType) -> u32 {
        match ty {
            TrackType::Width(w) => (*w).max(1),
            TrackType::Named(name) => self.tables.width(name, layer).unwrap_or(1),
        }
    }

    fn get_single_space(&self, layer: LayerId, ty: &TrackType) -> Result<HalfInt> {
        if let Some(sp) = ty.name().and_then(|name| self.tables.space(name, layer)) {
            return Ok(sp);
        }
        self.grid
            .get_num_space_tracks(layer, self.get_width(layer, ty), self.half_space)
    }

    /// The number of empty tracks required between an `a` wire and a `b` wire on `layer`.
    pub fn get_space(&self, layer: LayerId, a: &TrackType, b: &TrackType) -> Result<HalfInt> {
        if let (Some(na), Some(nb)) = (a.name(), b.name()) {
            if let Some(sp) = self.tables.pair_space(na, nb, layer) {
                return Ok(sp);
            }
        }
        let wmax = std::cmp::max(self.get_width(layer, a), self.get_width(layer, b));
        let min = self
            .grid
            .get_num_space_tracks(layer, wmax, self.half_space)?;
        let sa = self.get_single_space(layer, a)?;
        let sb = self.get_single_space(layer, b)?;
        Ok(sa.max(sb).max(min))
    }

    /// The track closest to `idx` on which a `next` wire can be placed beside a
    /// `cur` wire on track `idx`.
    ///
    /// Searches upward if `up` is set and downward otherwise.
    pub fn get_next_track(
        &self,
        layer: LayerId,
        idx: HalfInt,
        cur: &TrackType,
        next: &TrackType,
        up: bool,
    ) -> Result<HalfInt> {
        let sp = self.get_space(layer, cur, next)?;
        let delta = self.center_distance(layer, cur, next, sp);
        Ok(if up { idx + delta } else { idx - delta })
    }

    fn center_distance(&self, layer: LayerId, a: &TrackType, b: &TrackType, sp: HalfInt) -> HalfInt {
        let wa = self.get_width(layer, a) as i64;
        let wb = self.get_width(layer, b) as i64;
        HalfInt::from_dbl(wa + wb) + sp
    }

    fn gaps(
        &self,
        layer: LayerId,
        types: &[TrackType],
        sp_override: &[SpaceOverride],
    ) -> Result<Vec<HalfInt>> {
        types
            .windows(2)
            .map(|pair| {
                let forced = sp_override.iter().find(|(a, b, _)| {
                    (a == &pair[0] && b == &pair[1]) || (a == &pair[1] && b == &pair[0])
                });
                match forced {
                    Some((_, _, sp)) => Ok(*sp),
                    None => self.get_space(layer, &pair[0], &pair[1]),
                }
            })
            .collect()
    }

    fn layout(
        &self,
        layer: LayerId,
        types: &[TrackType],
        gaps: &[HalfInt],
        start: HalfInt,
    ) -> Vec<HalfInt> {
        let mut out = Vec::with_capacity(types.len());
        let Some(first) = types.first() else {
            return out;
        };
        let mut cur = start + HalfInt::from_dbl(self.get_width(layer, first) as i64 - 1);
        out.push(cur);
        for (pair, gap) in types.windows(2).zip(gaps) {
            cur = cur + self.center_distance(layer, &pair[0], &pair[1], *gap);
            out.push(cur);
        }
        out
    }

    fn used_tracks(&self, layer: LayerId, types: &[TrackType], gaps: &[HalfInt]) -> HalfInt {
        let widths: HalfInt = types
            .iter()
            .map(|t| HalfInt::new(self.get_width(layer, t) as i64))
            .sum();
        widths + gaps.iter().copied().sum::<HalfInt>()
    }

    /// Packs `types` onto consecutive tracks of `layer` starting at `start_idx`.
    ///
    /// Returns the number of tracks spanned, from the lower edge of the first wire
    /// to the upper edge of the last, and the center track of each wire.
    pub fn place_wires(
        &self,
        layer: LayerId,
        types: &[TrackType],
        start_idx: HalfInt,
    ) -> Result<(HalfInt, Vec<HalfInt>)> {
        let gaps = self.gaps(layer, types, &[])?;
        let used = self.used_tracks(layer, types, &gaps);
        let locs = self.layout(layer, types, &gaps, start_idx);
        trace!(layer, %used, "placed {} wires", types.len());
        Ok((used, locs))
    }

    fn check_fits(&self, layer: LayerId, needed: HalfInt, available: HalfInt) -> Result<()> {
        if needed > available {
            return Err(GridError::InsufficientSpace {
                layer,
                needed,
                available,
            });
        }
        Ok(())
    }

    /// The number of placement units (one or one half track) in `n` tracks.
    fn units(&self, n: HalfInt) -> i64 {
        if self.half_space {
            n.dbl()
        } else {
            n.floor()
        }
    }

    fn from_units(&self, n: i64) -> HalfInt {
        if self.half_space {
            HalfInt::from_dbl(n)
        } else {
            HalfInt::new(n)
        }
    }

    /// Places `types` in a slot of `ntr` tracks starting at `start_idx`.
    ///
    /// With [`Alignment::Center`], the spacings between wires are enlarged evenly,
    /// except for spacings next to a `key_type` wire, which keep their minimum
    /// value. `sp_override` forces the spacing between specific pairs of types.
    pub fn spread_wires(
        &self,
        layer: LayerId,
        types: &[TrackType],
        ntr: HalfInt,
        key_type: Option<&TrackType>,
        alignment: Alignment,
        start_idx: HalfInt,
        sp_override: &[SpaceOverride],
    ) -> Result<Vec<HalfInt>> {
        let mut gaps = self.gaps(layer, types, sp_override)?;
        let used = self.used_tracks(layer, types, &gaps);
        self.check_fits(layer, used, ntr)?;
        let extra = self.units(ntr - used);
        let lead = match alignment {
            Alignment::Lower => 0,
            Alignment::Upper => extra,
            Alignment::Center => {
                let flexible: Vec<usize> = types
                    .windows(2)
                    .enumerate()
                    .filter(|(_, pair)| {
                        key_type.map_or(true, |key| &pair[0] != key && &pair[1] != key)
                    })
                    .map(|(i, _)| i)
                    .collect();
                let mut rem = extra;
                if !flexible.is_empty() {
                    let per = extra / flexible.len() as i64;
                    for i in flexible.iter() {
                        gaps[*i] += self.from_units(per);
                    }
                    rem -= per * flexible.len() as i64;
                }
                rem / 2
            }
        };
        Ok(self.layout(layer, types, &gaps, start_idx + self.from_units(lead)))
    }

    /// Places `types` with minimum spacing in a slot of `ntr` tracks starting at
    /// `start_idx`, justified according to `alignment`.
    pub fn align_wires(
        &self,
        layer: LayerId,
        types: &[TrackType],
        ntr: HalfInt,
        alignment: Alignment,
        start_idx: HalfInt,
    ) -> Result<Vec<HalfInt>> {
        let gaps = self.gaps(layer, types, &[])?;
        let used = self.used_tracks(layer, types, &gaps);
        self.check_fits(layer, used, ntr)?;
        let extra = self.units(ntr - used);
        let lead = match alignment {
            Alignment::Lower => 0,
            Alignment::Center => extra / 2,
            Alignment::Upper => extra,
        };
        Ok(self.layout(layer, types, &gaps, start_idx + self.from_units(lead)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_type_from_yaml() {
        let types: Vec<TrackType> = serde_yaml::from_str("[sig, 2, clk]").unwrap();
        assert_eq!(
            types,
            vec![TrackType::from("sig"), TrackType::Width(2), TrackType::from("clk")]
        );
    }

    #[test]
    fn pair_keys_are_symmetric() {
        let tables = TrackTables::default().with_space("clk:sig", 4, HalfInt::from_dbl(3));
        assert_eq!(tables.pair_space("sig", "clk", 4), Some(HalfInt::from_dbl(3)));
        assert_eq!(tables.pair_space("clk", "sig", 4), Some(HalfInt::from_dbl(3)));
        assert_eq!(tables.pair_space("clk", "sig", 3), None);
    }
}
