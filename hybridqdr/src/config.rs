//! YAML configuration of a TapX column.
//!
//! The top-level keys mirror the parameter dictionaries handed to the
//! generators. Keys the generators do not consume are ignored.

use std::path::Path;

use arcstr::ArcStr;
use indexmap::IndexMap;
use routing::{HalfInt, LayerId, TrackTables};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::divider::{DigitalParams, DividerColumn, DividerSegs};
use crate::error::{Error, Result};
use crate::qdr::bias::BiasConfig;
use crate::qdr::column::TapXColumn;
use crate::qdr::summer::TapXSummer;
use crate::qdr::summer_cell::SummerParams;
use crate::qdr::{DeviceParams, SegDict};

/// A value for NMOS and PMOS devices.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MosDict<T> {
    /// The NMOS value.
    pub n: T,
    /// The PMOS value.
    pub p: T,
}

type WidthTable = IndexMap<ArcStr, IndexMap<LayerId, u32>>;
type SpaceTable = IndexMap<ArcStr, IndexMap<LayerId, HalfInt>>;

/// The parameters of a [`TapXColumn`], as read from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapXColumnConfig {
    /// The channel length, in meters.
    pub lch: Decimal,
    /// The substrate tap width.
    pub ptap_w: u32,
    /// The well tap width.
    pub ntap_w: u32,
    /// Summer amplifier device widths.
    pub w_sum: DeviceParams<u32>,
    /// Latch device widths.
    pub w_lat: DeviceParams<u32>,
    /// Summer amplifier threshold flavors.
    pub th_sum: DeviceParams<ArcStr>,
    /// Latch threshold flavors.
    pub th_lat: DeviceParams<ArcStr>,
    /// Digital device widths.
    pub w_dict: MosDict<u32>,
    /// Digital threshold flavors.
    pub th_dict: MosDict<ArcStr>,
    /// Segments of the main cursor summer.
    pub seg_main: SegDict,
    /// Segments of FFE taps 1, 2, ...
    #[serde(default)]
    pub seg_ffe_list: Vec<SegDict>,
    /// Segments of DFE taps 2, 3, ...
    #[serde(default)]
    pub seg_dfe_list: Vec<SegDict>,
    /// Segments of every latch.
    pub seg_lat: SegDict,
    /// Output polarity flips: the main cursor, then FFE taps, then DFE taps.
    #[serde(default)]
    pub flip_sign_list: Vec<bool>,
    /// Dummy fingers at each summer edge.
    pub fg_dum: u32,
    /// Analog wire widths.
    #[serde(default)]
    pub tr_widths: WidthTable,
    /// Analog wire spacings.
    #[serde(default)]
    pub tr_spaces: SpaceTable,
    /// Digital wire widths.
    #[serde(default)]
    pub tr_widths_dig: WidthTable,
    /// Digital wire spacings.
    #[serde(default)]
    pub tr_spaces_dig: SpaceTable,
    /// Bias lane geometry per layer.
    pub bias_config: BiasConfig,
    /// Segments of the divider column blocks.
    pub seg_div_tapx: DividerSegs,
    /// The minimum divider block width, in fingers.
    #[serde(default)]
    pub fg_min_div: u32,
    /// Whether pin labels are visible.
    #[serde(default)]
    pub show_pins: bool,
}

impl TapXColumnConfig {
    /// Parses a configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading tapx column config");
        let s = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&s)
    }

    /// The number of summer taps, the main cursor included.
    pub fn num_taps(&self) -> usize {
        1 + self.seg_ffe_list.len() + self.seg_dfe_list.len()
    }

    fn summer_params(&self) -> SummerParams {
        SummerParams {
            lch: self.lch,
            ptap_w: self.ptap_w,
            ntap_w: self.ntap_w,
            w_sum: self.w_sum.clone(),
            w_lat: self.w_lat.clone(),
            th_sum: self.th_sum.clone(),
            th_lat: self.th_lat.clone(),
            fg_dum: self.fg_dum,
            tr_tables: TrackTables::new(self.tr_widths.clone(), self.tr_spaces.clone()),
            show_pins: self.show_pins,
        }
    }

    fn digital_params(&self) -> DigitalParams {
        DigitalParams {
            lch: self.lch,
            ptap_w: self.ptap_w,
            ntap_w: self.ntap_w,
            w_n: self.w_dict.n,
            w_p: self.w_dict.p,
            th_n: self.th_dict.n.clone(),
            th_p: self.th_dict.p.clone(),
            tr_tables: TrackTables::new(self.tr_widths_dig.clone(), self.tr_spaces_dig.clone()),
            show_pins: self.show_pins,
        }
    }

    /// The column generator described by this configuration.
    pub fn tapx_column(&self) -> Result<TapXColumn> {
        if self.flip_sign_list.len() > self.num_taps() {
            return Err(Error::config(format!(
                "flip_sign_list has {} entries but there are only {} taps",
                self.flip_sign_list.len(),
                self.num_taps()
            )));
        }
        Ok(TapXColumn {
            summer: TapXSummer {
                params: self.summer_params(),
                seg_main: self.seg_main.clone(),
                seg_ffe: self.seg_ffe_list.clone(),
                seg_dfe: self.seg_dfe_list.clone(),
                seg_lat: self.seg_lat.clone(),
                flip_sign: self.flip_sign_list.clone(),
            },
            divider: DividerColumn {
                params: self.digital_params(),
                seg: self.seg_div_tapx,
                fg_min: self.fg_min_div,
            },
            bias_config: self.bias_config.clone(),
            show_pins: self.show_pins,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tests::{demo_column, demo_ctx};

    const DEMO: &str = include_str!("../configs/tapx_column.yaml");

    #[test]
    fn demo_config_describes_the_demo_column() {
        let cfg = TapXColumnConfig::from_yaml_str(DEMO).unwrap();
        assert_eq!(cfg.num_taps(), 4);
        assert_eq!(cfg.tapx_column().unwrap(), demo_column(2, 2));
    }

    #[test]
    fn demo_config_generates() {
        let ctx = demo_ctx();
        let col = TapXColumnConfig::from_yaml_str(DEMO)
            .unwrap()
            .tapx_column()
            .unwrap();
        let master = ctx.new_template(col).unwrap();
        assert!(master.has_port("clkp<0>"));
        assert!(master.has_port("biasn_m"));
    }

    #[test]
    fn too_many_sign_flips_are_rejected() {
        let mut cfg = TapXColumnConfig::from_yaml_str(DEMO).unwrap();
        cfg.flip_sign_list = vec![false; cfg.num_taps() + 1];
        assert!(matches!(cfg.tapx_column(), Err(Error::Config(_))));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let err = TapXColumnConfig::from_yaml_str("lch: [").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = TapXColumnConfig::from_yaml_file("no/such/tapx_column.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
