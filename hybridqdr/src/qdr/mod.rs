//! Hybrid quarter-rate receiver generators.
//!
//! The column is built bottom-up: integrating amplifiers ([`integ_amp`])
//! pair into summer cells ([`summer_cell`]), summer cells are packed into
//! tap rows ([`summer`]), and four rows plus the divider column form a
//! [`column::TapXColumn`]. Bias nets are routed in shielded lanes
//! ([`bias`]).

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

pub mod bias;
pub mod column;
pub mod info;
pub mod integ_amp;
pub mod summer;
pub mod summer_cell;

pub use info::{get_integ_amp_info, Half, IntegAmpInfo, SdNets, SegDict};

/// A value per integrating amplifier device role.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct DeviceParams<T> {
    /// The tail device.
    pub tail: T,
    /// The clocked enable device and the tail switch.
    pub nen: T,
    /// The input pair.
    #[serde(rename = "in")]
    pub input: T,
    /// The cascode pair.
    pub casc: T,
    /// The butterfly switches.
    pub but: T,
    /// The PMOS load.
    pub load: T,
    /// The PMOS enable.
    pub pen: T,
}

impl<T: Clone> DeviceParams<T> {
    /// The same value for every role.
    pub fn uniform(value: T) -> Self {
        Self {
            tail: value.clone(),
            nen: value.clone(),
            input: value.clone(),
            casc: value.clone(),
            but: value.clone(),
            load: value.clone(),
            pen: value,
        }
    }
}

/// The suffix distinguishing the pins of one summer cell.
pub(crate) fn tap_suffix(kind: TapKind) -> ArcStr {
    match kind {
        TapKind::Main => arcstr::literal!("m"),
        TapKind::Ffe(k) => ArcStr::from(format!("a{k}")),
        TapKind::Dfe(k) => ArcStr::from(format!("d{k}")),
    }
}

/// The role of a summer cell within a tap row.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TapKind {
    /// The main cursor.
    Main,
    /// Feed-forward tap `k`.
    Ffe(u32),
    /// Decision-feedback tap `k`.
    Dfe(u32),
}

impl TapKind {
    /// The letter naming the bias nets of taps of this kind.
    pub fn bias_letter(&self) -> char {
        match self {
            Self::Main => 'm',
            Self::Ffe(_) => 'a',
            Self::Dfe(_) => 'd',
        }
    }

    /// The tap index, zero for the main cursor.
    pub fn index(&self) -> u32 {
        match self {
            Self::Main => 0,
            Self::Ffe(k) | Self::Dfe(k) => *k,
        }
    }
}
