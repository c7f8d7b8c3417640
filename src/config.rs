use crate::error::AnimError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

/// Top-level configuration for Starfall
#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub starfield: StarfieldConfig,

    #[serde(default)]
    pub comet: CometConfig,

    #[serde(default)]
    pub monitors: HashMap<String, MonitorConfig>,
}

/// General daemon settings
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Upper bound on starfield redraws per second (default: 45)
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Fraction of the output size the starfield is rendered at before the
    /// compositor scales it up (default: 0.75)
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,

    /// Pause the starfield on outputs covered by a fullscreen window
    /// (needs Hyprland IPC)
    #[serde(default = "default_true")]
    pub track_fullscreen: bool,
}

/// Parameters of the starfield shader. Immutable once a surface is mounted;
/// changing them means remounting.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StarfieldConfig {
    /// Centre of the field as a fraction of the surface, [0,1] on both axes
    pub focal: [f32; 2],
    /// Static rotation applied before the auto-rotation, as (cos, sin)
    pub rotation: [f32; 2],
    /// How fast the depth layers scroll towards the viewer
    pub star_speed: f32,
    /// Star grid density multiplier
    pub density: f32,
    /// Global animation speed multiplier
    pub speed: f32,
    pub glow_intensity: f32,
    pub saturation: f32,
    /// Constant auto-rotation in radians per second
    pub rotation_speed: f32,
    /// Emit alpha from star brightness instead of an opaque black sky
    pub transparent: bool,
    /// Draw a single still frame and never advance time
    pub disable_animation: bool,
}

/// One-shot comet flyby settings
#[derive(Debug, Deserialize, Clone)]
pub struct CometConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between the first starfield frame and the comet launch
    #[serde(default = "default_comet_delay")]
    pub delay_ms: u64,

    /// Output to fly over; defaults to the first output whose starfield is ready
    pub output: Option<String>,
}

/// Per-monitor overrides
#[derive(Debug, Default, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Do not put a starfield on this monitor
    #[serde(default)]
    pub disabled: bool,
}

// Default value functions
fn default_frame_rate() -> u32 {
    45
}
fn default_render_scale() -> f32 {
    0.75
}
fn default_comet_delay() -> u64 {
    1200
}
fn default_true() -> bool {
    true
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            render_scale: default_render_scale(),
            track_fullscreen: true,
        }
    }
}

impl Default for StarfieldConfig {
    fn default() -> Self {
        Self {
            focal: [0.5, 0.5],
            rotation: [1.0, 0.0],
            star_speed: 0.15,
            density: 0.8,
            speed: 0.3,
            glow_intensity: 0.3,
            saturation: 0.0,
            rotation_speed: 0.02,
            transparent: false,
            disable_animation: false,
        }
    }
}

impl Default for CometConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: default_comet_delay(),
            output: None,
        }
    }
}

fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> AnimError {
    AnimError::InvalidConfig {
        field,
        value: value.to_string(),
        expected,
    }
}

fn check_finite(field: &'static str, value: f32) -> Result<(), AnimError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, value, "a finite number"))
    }
}

impl StarfieldConfig {
    pub fn validate(&self) -> Result<(), AnimError> {
        for (field, v) in [
            ("starfield.focal[0]", self.focal[0]),
            ("starfield.focal[1]", self.focal[1]),
            ("starfield.rotation[0]", self.rotation[0]),
            ("starfield.rotation[1]", self.rotation[1]),
            ("starfield.star_speed", self.star_speed),
            ("starfield.density", self.density),
            ("starfield.speed", self.speed),
            ("starfield.glow_intensity", self.glow_intensity),
            ("starfield.saturation", self.saturation),
            ("starfield.rotation_speed", self.rotation_speed),
        ] {
            check_finite(field, v)?;
        }
        if self.focal.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(invalid(
                "starfield.focal",
                format!("{:?}", self.focal),
                "both components in [0, 1]",
            ));
        }
        if self.density < 0.0 {
            return Err(invalid("starfield.density", self.density, "a value >= 0"));
        }
        if self.speed < 0.0 {
            return Err(invalid("starfield.speed", self.speed, "a value >= 0"));
        }
        if self.star_speed < 0.0 {
            return Err(invalid("starfield.star_speed", self.star_speed, "a value >= 0"));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> Result<Self, AnimError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnimError> {
        if self.general.frame_rate == 0 {
            return Err(invalid("general.frame_rate", 0, "at least 1"));
        }
        let scale = self.general.render_scale;
        if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
            return Err(invalid("general.render_scale", scale, "a value in (0, 1]"));
        }
        self.starfield.validate()
    }

    /// Whether a starfield should be mounted on the named output
    pub fn output_enabled(&self, name: &str) -> bool {
        !self.monitors.get(name).is_some_and(|m| m.disabled)
    }
}
