//! Node type registry and parameter schemas.
//!
//! Every node type maps to a fixed parameter schema. Numeric parameters carry a
//! `[min, max]` range and an automatable flag; enumerated parameters carry their
//! option set; boolean parameters accept a small set of coercible spellings.
//!
//! [`ParamSpec::coerce`] is the single entry point for turning an incoming
//! [`ParamValue`] into a value a node can apply. Out-of-range numbers are
//! clamped (and reported as clamped) rather than rejected, so real-time control
//! surfaces never fail on a stray value.

use crate::model::ParamValue;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Parameter validation failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    /// The node type has no parameter with this name.
    #[error("unknown parameter '{param}' for node type '{node_type}'")]
    UnknownParameter {
        /// Node type name.
        node_type: String,
        /// Unrecognized parameter.
        param: String,
    },

    /// Numeric value outside its range. Only produced by [`ParamSpec::check`];
    /// [`ParamSpec::coerce`] clamps instead.
    #[error("parameter '{param}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Parameter name.
        param: String,
        /// Offending value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// Value not among the enumerated options.
    #[error("parameter '{param}' has no option '{value}' (expected one of: {options})")]
    InvalidOption {
        /// Parameter name.
        param: String,
        /// Offending value.
        value: String,
        /// Comma-separated allowed options.
        options: String,
    },

    /// Value of the wrong kind.
    #[error("parameter '{param}' expects {expected}, got '{value}'")]
    TypeMismatch {
        /// Parameter name.
        param: String,
        /// Kind the schema expects.
        expected: &'static str,
        /// Offending value.
        value: String,
    },

    /// The parameter exists but cannot be automated or scheduled.
    #[error("parameter '{param}' of node type '{node_type}' is not automatable")]
    NotAutomatable {
        /// Node type name.
        node_type: String,
        /// Parameter name.
        param: String,
    },
}

/// Built-in node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    /// Plays a decoded sample asset.
    Player,
    /// Periodic waveform generator.
    Oscillator,
    /// Seeded noise generator.
    Noise,
    /// Linear gain stage.
    Gain,
    /// Biquad filter.
    Filter,
    /// Feedback delay line.
    Delay,
    /// Stereo panner.
    Panner,
}

/// Error returned when parsing an unregistered node type name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node type: {0}")]
pub struct UnknownNodeType(pub String);

impl NodeType {
    /// Every registered type, in registry order.
    pub const ALL: [NodeType; 7] = [
        Self::Player,
        Self::Oscillator,
        Self::Noise,
        Self::Gain,
        Self::Filter,
        Self::Delay,
        Self::Panner,
    ];

    /// Canonical type name used in specs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Oscillator => "oscillator",
            Self::Noise => "noise",
            Self::Gain => "gain",
            Self::Filter => "filter",
            Self::Delay => "delay",
            Self::Panner => "panner",
        }
    }

    /// Parameter schema for this type.
    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            Self::Player => PLAYER_PARAMS,
            Self::Oscillator => OSCILLATOR_PARAMS,
            Self::Noise => NOISE_PARAMS,
            Self::Gain => GAIN_PARAMS,
            Self::Filter => FILTER_PARAMS,
            Self::Delay => DELAY_PARAMS,
            Self::Panner => PANNER_PARAMS,
        }
    }

    /// Looks up one parameter of this type.
    pub fn param(self, name: &str) -> Result<&'static ParamSpec, ParamError> {
        self.params()
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ParamError::UnknownParameter {
                node_type: self.as_str().to_string(),
                param: name.to_string(),
            })
    }

    /// Looks up a parameter that must be automatable.
    pub fn automatable_param(self, name: &str) -> Result<&'static ParamSpec, ParamError> {
        let spec = self.param(name)?;
        if spec.automatable {
            Ok(spec)
        } else {
            Err(ParamError::NotAutomatable {
                node_type: self.as_str().to_string(),
                param: name.to_string(),
            })
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownNodeType(s.to_string()))
    }
}

/// Shape of a parameter's value domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    /// Continuous number in `[min, max]`.
    Number {
        /// Minimum value.
        min: f64,
        /// Maximum value.
        max: f64,
        /// Default value.
        default: f64,
    },
    /// One of a fixed set of names.
    Enum {
        /// Allowed options.
        options: &'static [&'static str],
        /// Default option.
        default: &'static str,
    },
    /// On/off switch.
    Bool {
        /// Default state.
        default: bool,
    },
}

/// Schema entry for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Parameter name as used in specs.
    pub name: &'static str,
    /// Value domain.
    pub kind: ParamKind,
    /// Whether the parameter accepts scheduled changes and automation curves.
    pub automatable: bool,
}

/// Result of a successful [`ParamSpec::coerce`].
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    /// Value to apply.
    pub value: ParamValue,
    /// Whether a numeric input was clamped into range.
    pub clamped: bool,
}

impl ParamSpec {
    const fn number(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Number { min, max, default },
            automatable: true,
        }
    }

    const fn fixed_number(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Number { min, max, default },
            automatable: false,
        }
    }

    const fn choice(
        name: &'static str,
        options: &'static [&'static str],
        default: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Enum { options, default },
            automatable: false,
        }
    }

    const fn switch(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Bool { default },
            automatable: false,
        }
    }

    /// Default value for this parameter.
    pub fn default_value(&self) -> ParamValue {
        match self.kind {
            ParamKind::Number { default, .. } => ParamValue::Number(default),
            ParamKind::Enum { default, .. } => ParamValue::Text(default.to_string()),
            ParamKind::Bool { default } => ParamValue::Bool(default),
        }
    }

    /// Numeric range, if this is a numeric parameter.
    pub fn range(&self) -> Option<(f64, f64)> {
        match self.kind {
            ParamKind::Number { min, max, .. } => Some((min, max)),
            _ => None,
        }
    }

    /// Clamps a number into this parameter's range. Non-numeric kinds pass through.
    pub fn clamp(&self, value: f64) -> f64 {
        match self.kind {
            ParamKind::Number { min, max, .. } => value.clamp(min, max),
            _ => value,
        }
    }

    /// Validates and normalizes a value for application.
    ///
    /// Numbers are clamped to `[min, max]`; numeric text is parsed. Enum values
    /// must name a listed option. Booleans accept `true`/`false`, numbers
    /// (non-zero is true), and the strings `"true"`, `"false"`, `"on"`, `"off"`,
    /// `"1"`, `"0"`.
    pub fn coerce(&self, value: &ParamValue) -> Result<Coerced, ParamError> {
        match self.kind {
            ParamKind::Number { min, max, .. } => {
                let raw = match value {
                    ParamValue::Number(v) => Some(*v),
                    ParamValue::Text(s) => s.trim().parse::<f64>().ok(),
                    ParamValue::Bool(_) => None,
                };
                let raw = raw
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| self.mismatch("a finite number", value))?;
                let clamped = raw.clamp(min, max);
                Ok(Coerced {
                    value: ParamValue::Number(clamped),
                    clamped: clamped != raw,
                })
            }
            ParamKind::Enum { options, .. } => {
                let text = value.as_str().ok_or_else(|| self.mismatch("an option name", value))?;
                if options.contains(&text) {
                    Ok(Coerced {
                        value: value.clone(),
                        clamped: false,
                    })
                } else {
                    Err(ParamError::InvalidOption {
                        param: self.name.to_string(),
                        value: text.to_string(),
                        options: options.join(", "),
                    })
                }
            }
            ParamKind::Bool { .. } => {
                let b = match value {
                    ParamValue::Bool(b) => Some(*b),
                    ParamValue::Number(v) => Some(*v != 0.0),
                    ParamValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                        "true" | "on" | "1" => Some(true),
                        "false" | "off" | "0" => Some(false),
                        _ => None,
                    },
                };
                let b = b.ok_or_else(|| self.mismatch("a boolean", value))?;
                Ok(Coerced {
                    value: ParamValue::Bool(b),
                    clamped: false,
                })
            }
        }
    }

    /// Strict check used by batch validation: like [`coerce`](Self::coerce)
    /// but reports out-of-range numbers instead of clamping them.
    pub fn check(&self, value: &ParamValue) -> Result<(), ParamError> {
        let coerced = self.coerce(value)?;
        if coerced.clamped {
            let (min, max) = self.range().unwrap_or((f64::MIN, f64::MAX));
            return Err(ParamError::OutOfRange {
                param: self.name.to_string(),
                value: value.as_f64().unwrap_or(f64::NAN),
                min,
                max,
            });
        }
        Ok(())
    }

    fn mismatch(&self, expected: &'static str, value: &ParamValue) -> ParamError {
        ParamError::TypeMismatch {
            param: self.name.to_string(),
            expected,
            value: value.to_string(),
        }
    }
}

/// Oscillator waveforms.
pub const WAVEFORMS: &[&str] = &["sine", "square", "sawtooth", "triangle"];
/// Filter responses.
pub const FILTER_TYPES: &[&str] = &["lowpass", "highpass", "bandpass", "notch"];
/// Noise colors.
pub const NOISE_COLORS: &[&str] = &["white", "pink"];

const PLAYER_PARAMS: &[ParamSpec] = &[
    ParamSpec::number("gain", 0.0, 4.0, 1.0),
    ParamSpec::number("playbackRate", 0.25, 4.0, 1.0),
    ParamSpec::fixed_number("offset", 0.0, 3600.0, 0.0),
    ParamSpec::switch("loop", false),
];

const OSCILLATOR_PARAMS: &[ParamSpec] = &[
    ParamSpec::number("frequency", 20.0, 20000.0, 440.0),
    ParamSpec::number("gain", 0.0, 4.0, 0.5),
    ParamSpec::choice("waveform", WAVEFORMS, "sine"),
];

const NOISE_PARAMS: &[ParamSpec] = &[
    ParamSpec::number("gain", 0.0, 4.0, 0.25),
    ParamSpec::choice("color", NOISE_COLORS, "white"),
];

const GAIN_PARAMS: &[ParamSpec] = &[ParamSpec::number("gain", 0.0, 4.0, 1.0)];

const FILTER_PARAMS: &[ParamSpec] = &[
    ParamSpec::choice("type", FILTER_TYPES, "lowpass"),
    ParamSpec::number("frequency", 20.0, 20000.0, 1000.0),
    ParamSpec::number("q", 0.1, 20.0, std::f64::consts::FRAC_1_SQRT_2),
];

const DELAY_PARAMS: &[ParamSpec] = &[
    ParamSpec::number("time", 0.0, 2.0, 0.25),
    ParamSpec::number("feedback", 0.0, 0.95, 0.3),
    ParamSpec::number("mix", 0.0, 1.0, 0.5),
];

const PANNER_PARAMS: &[ParamSpec] = &[ParamSpec::number("pan", -1.0, 1.0, 0.0)];
