use crate::activation::Activation;
use crate::errors::{RealignError, RealignResult};
use crate::grid::Connectivity;
use serde::{Deserialize, Serialize};

/// Everything tunable for one realignment run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealignConfig {
    pub raster: RasterConfig,
    pub channels: ChannelConfigs,
    pub smoothing: SmoothingConfig,
    pub masks: MaskConfig,
    pub bridge: BridgeConfig,
    pub graph: GraphConfig,
    pub path: PathConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKernel {
    Sobel3,
    Sobel5,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Finest accepted ground-model cell size; finer grids are averaged down to it
    pub native_resolution: f64,
    /// Working resolution is `native_resolution * aggregation_factor`
    pub aggregation_factor: usize,
    /// Height band above ground counted as ground returns
    pub ground_band: (f64, f64),
    /// Height band above ground counted as low obstructions
    pub low_band: (f64, f64),
    /// Returns steeper than this (degrees) are fringe and dropped from densities
    pub max_scan_angle: f32,
    pub intensity_percentile: f64,
    pub density_percentile: f64,
    pub edge_kernel: EdgeKernel,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            native_resolution: 1.0,
            aggregation_factor: 2,
            ground_band: (-0.3, 0.3),
            low_band: (0.3, 2.0),
            max_scan_angle: 15.0,
            intensity_percentile: 0.98,
            density_percentile: 0.95,
            edge_kernel: EdgeKernel::Sobel3,
        }
    }
}

/// Activation and combination weight for one feature layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub activation: Activation,
    pub weight: f64,
}

impl ChannelConfig {
    fn new(activation: Activation, weight: f64) -> Self {
        Self { activation, weight }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfigs {
    pub slope: ChannelConfig,
    pub roughness: ChannelConfig,
    pub edge_strength: ChannelConfig,
    pub intensity_range: ChannelConfig,
    pub canopy_height: ChannelConfig,
    pub ground_density: ChannelConfig,
    pub low_point_density: ChannelConfig,
}

impl Default for ChannelConfigs {
    fn default() -> Self {
        Self {
            // degrees
            slope: ChannelConfig::new(Activation::piecewise(4.0, 15.0, false), 1.0),
            roughness: ChannelConfig::new(Activation::piecewise(0.05, 0.3, false), 1.0),
            edge_strength: ChannelConfig::new(Activation::piecewise(2.0, 10.0, true), 0.5),
            intensity_range: ChannelConfig::new(Activation::piecewise(0.2, 0.6, false), 0.5),
            canopy_height: ChannelConfig::new(Activation::threshold(2.0, false), 1.0),
            ground_density: ChannelConfig::new(Activation::piecewise(0.2, 0.8, true), 1.0),
            low_point_density: ChannelConfig::new(Activation::piecewise(0.2, 0.6, false), 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub iterations: usize,
    pub passes: usize,
    /// Diffusion step size, stable for 4-neighbour updates up to 0.25
    pub lambda: f64,
    /// Gradient magnitude above which diffusion is suppressed
    pub k: f64,
    pub stretch_quantile: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            passes: 2,
            lambda: 0.2,
            k: 0.15,
            stretch_quantile: 0.98,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    pub buffer_radius: f64,
    /// Length of the terminal sub-segment turned into a cap, independent of line length
    pub cap_length: f64,
    pub shield_width: f64,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            buffer_radius: 10.0,
            cap_length: 5.0,
            shield_width: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub buffer: f64,
    pub conductivity: f64,
    /// Water returns higher than this above ground count as bridge deck
    pub water_height_threshold: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            buffer: 5.0,
            conductivity: 1.0,
            water_height_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub connectivity: Connectivity,
    pub floor: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Eight,
            floor: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub simplify_tolerance: f64,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            simplify_tolerance: 1.0,
        }
    }
}

fn ensure(cond: bool, msg: impl FnOnce() -> String) -> RealignResult<()> {
    if cond {
        Ok(())
    } else {
        Err(RealignError::InvalidConfig(msg()))
    }
}

fn is_unit_fraction(q: f64) -> bool {
    q > 0.0 && q <= 1.0
}

impl RealignConfig {
    /// Rejects settings that would make later stages meaningless.
    pub fn validate(&self) -> RealignResult<()> {
        let r = &self.raster;
        ensure(r.native_resolution > 0.0, || {
            format!("native_resolution must be positive, got {}", r.native_resolution)
        })?;
        ensure(r.aggregation_factor >= 1, || "aggregation_factor must be at least 1".to_string())?;
        ensure(r.ground_band.0 < r.ground_band.1, || {
            format!("ground_band is empty: {:?}", r.ground_band)
        })?;
        ensure(r.low_band.0 < r.low_band.1, || format!("low_band is empty: {:?}", r.low_band))?;
        ensure(
            is_unit_fraction(r.intensity_percentile) && is_unit_fraction(r.density_percentile),
            || "percentiles must lie in (0, 1]".to_string(),
        )?;

        for (name, channel) in self.channels.iter() {
            channel.activation.validate()?;
            ensure(channel.weight >= 0.0 && channel.weight.is_finite(), || {
                format!("{} weight must be non-negative, got {}", name, channel.weight)
            })?;
        }
        ensure(self.channels.iter().any(|(_, c)| c.weight > 0.0), || {
            "at least one channel needs a positive weight".to_string()
        })?;

        let s = &self.smoothing;
        ensure(s.lambda >= 0.0 && s.lambda <= 0.25, || {
            format!("lambda must lie in [0, 0.25], got {}", s.lambda)
        })?;
        ensure(s.k > 0.0, || format!("k must be positive, got {}", s.k))?;
        ensure(is_unit_fraction(s.stretch_quantile), || {
            format!("stretch_quantile must lie in (0, 1], got {}", s.stretch_quantile)
        })?;

        let m = &self.masks;
        ensure(m.buffer_radius > 0.0, || "buffer_radius must be positive".to_string())?;
        ensure(m.cap_length > 0.0, || "cap_length must be positive".to_string())?;
        ensure(m.shield_width > 0.0, || "shield_width must be positive".to_string())?;

        ensure(self.bridge.buffer >= 0.0, || "bridge buffer must be non-negative".to_string())?;
        ensure(is_unit_fraction(self.graph.floor), || {
            format!("floor must lie in (0, 1], got {}", self.graph.floor)
        })?;
        ensure(self.path.simplify_tolerance >= 0.0, || {
            "simplify_tolerance must be non-negative".to_string()
        })?;
        Ok(())
    }
}

impl ChannelConfigs {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ChannelConfig)> {
        [
            ("slope", &self.slope),
            ("roughness", &self.roughness),
            ("edge_strength", &self.edge_strength),
            ("intensity_range", &self.intensity_range),
            ("canopy_height", &self.canopy_height),
            ("ground_density", &self.ground_density),
            ("low_point_density", &self.low_point_density),
        ]
        .into_iter()
    }
}
