//! Transistor row technology parameters.

use std::fmt::Display;

use geometry::dir::Dir;
use routing::{LayerId, RoutingGrid};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The kind of a transistor row.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MosType {
    /// NMOS devices.
    Nch,
    /// PMOS devices.
    Pch,
    /// P-type substrate taps.
    Ptap,
    /// N-type well taps.
    Ntap,
}

impl MosType {
    /// Whether this is a row of substrate or well taps.
    pub fn is_tap(&self) -> bool {
        matches!(self, Self::Ptap | Self::Ntap)
    }

    /// The supply net that dummy fingers and taps of this kind are tied to.
    pub fn supply(&self) -> &'static str {
        match self {
            Self::Nch | Self::Ptap => "VSS",
            Self::Pch | Self::Ntap => "VDD",
        }
    }
}

impl Display for MosType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Nch => "nch",
            Self::Pch => "pch",
            Self::Ptap => "ptap",
            Self::Ntap => "ntap",
        };
        write!(f, "{name}")
    }
}

/// Technology parameters of transistor rows.
///
/// Source/drain junction `j` of a row is centered on track `j - 1/2` of the
/// connection layer and finger `k` has its gate on track `k`, so the
/// source/drain pitch equals the connection layer pitch.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MosTech {
    /// The vertical layer that device terminals are drawn on.
    pub mos_conn_layer: LayerId,
    /// Minimum number of fingers separating two devices in the same row.
    pub min_fg_sep: u32,
    /// Minimum number of fingers of a decoupling capacitor.
    pub min_fg_decap: u32,
    /// Column granularity of digital rows.
    pub fg_unit: u32,
    /// Device width that fits within one horizontal track of row height.
    pub w_per_track: u32,
    /// Minimum height of a device body, in horizontal tracks.
    pub min_mos_tracks: u32,
    /// Height of a tap row body, in horizontal tracks.
    pub tap_tracks: u32,
}

impl MosTech {
    /// Checks the parameters against the routing grid.
    pub fn validate(&self, grid: &RoutingGrid) -> Result<()> {
        grid.require_dir(self.mos_conn_layer, Dir::Vert)?;
        grid.require_dir(self.hm_layer(), Dir::Horiz)?;
        if self.fg_unit == 0 || self.w_per_track == 0 {
            return Err(Error::config("fg_unit and w_per_track must be positive"));
        }
        Ok(())
    }

    /// The horizontal layer of row wires.
    #[inline]
    pub fn hm_layer(&self) -> LayerId {
        self.mos_conn_layer + 1
    }

    /// The first vertical routing layer above the rows.
    #[inline]
    pub fn vm_layer(&self) -> LayerId {
        self.mos_conn_layer + 2
    }

    /// The second horizontal routing layer above the rows.
    #[inline]
    pub fn xm_layer(&self) -> LayerId {
        self.mos_conn_layer + 3
    }

    /// The second vertical routing layer above the rows.
    #[inline]
    pub fn ym_layer(&self) -> LayerId {
        self.mos_conn_layer + 4
    }

    /// The source/drain pitch.
    pub fn sd_pitch(&self, grid: &RoutingGrid) -> Result<i64> {
        Ok(grid.get_track_pitch(self.mos_conn_layer)?)
    }

    /// The height of a device body of width `w`, in horizontal tracks.
    pub fn device_tracks(&self, w: u32) -> i64 {
        std::cmp::max(self.min_mos_tracks, w.div_ceil(self.w_per_track)) as i64
    }

    /// The separation between devices of digital rows.
    pub fn laygo_sep(&self) -> u32 {
        self.min_fg_sep.div_ceil(self.fg_unit) * self.fg_unit
    }
}
