//! Positions, distance attenuation and gain ramps for emitters.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    /// X.
    pub x: f64,
    /// Y.
    pub y: f64,
    /// Z.
    pub z: f64,
}

impl Vec3 {
    /// Creates a point.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared distance to `other`.
    pub fn distance_sq(self, other: Vec3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Whether every component is finite.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Shared, externally driven position of a scene object.
///
/// The scene collaborator moves the object with [`set`](Self::set); the
/// spatial layer reads it once per frame.
#[derive(Debug, Clone, Default)]
pub struct PositionHandle(Arc<Mutex<Vec3>>);

impl PositionHandle {
    /// Creates a handle at `position`.
    pub fn new(position: Vec3) -> Self {
        Self(Arc::new(Mutex::new(position)))
    }

    /// Current position.
    pub fn get(&self) -> Vec3 {
        *self.0.lock()
    }

    /// Moves the object.
    pub fn set(&self, position: Vec3) {
        *self.0.lock() = position;
    }
}

/// Identity and rate of an audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioContextInfo {
    /// Context identity. Two contexts with different ids run on separate
    /// clocks.
    pub id: u64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

/// The spatial "ears": where the listener is and which context it runs in.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    /// Listener position.
    pub position: PositionHandle,
    /// Listener audio context.
    pub context: AudioContextInfo,
}

/// Distance attenuation curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceModel {
    /// Linear falloff reaching `1 - rolloff` at `max_distance`.
    Linear,
    /// `ref / (ref + rolloff * (d - ref))`.
    #[default]
    Inverse,
    /// `(d / ref) ^ -rolloff`.
    Exponential,
}

/// Attenuation settings of one emitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceParams {
    /// Distance at which attenuation starts.
    pub ref_distance: f64,
    /// Attenuation rate.
    pub rolloff: f64,
    /// Distance beyond which attenuation stops changing.
    pub max_distance: f64,
    /// Curve.
    pub model: DistanceModel,
}

impl DistanceParams {
    /// Linear gain at `distance`.
    pub fn gain(&self, distance: f64) -> f64 {
        let r = self.ref_distance.max(f64::EPSILON);
        let max = self.max_distance.max(r);
        let d = distance.clamp(r, max);
        let gain = match self.model {
            DistanceModel::Linear => {
                if max <= r {
                    1.0
                } else {
                    1.0 - self.rolloff * (d - r) / (max - r)
                }
            }
            DistanceModel::Inverse => r / (r + self.rolloff * (d - r)),
            DistanceModel::Exponential => (d / r).powf(-self.rolloff),
        };
        gain.clamp(0.0, 1.0)
    }
}

/// Linear gain ramp evaluated against clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    from: f64,
    to: f64,
    start: f64,
    duration: f64,
}

impl GainRamp {
    /// Constant gain.
    pub fn fixed(gain: f64) -> Self {
        Self {
            from: gain,
            to: gain,
            start: 0.0,
            duration: 0.0,
        }
    }

    /// Gain at `now`.
    pub fn value(&self, now: f64) -> f64 {
        if self.duration <= 0.0 || now >= self.start + self.duration {
            return self.to;
        }
        if now <= self.start {
            return self.from;
        }
        let t = (now - self.start) / self.duration;
        self.from + (self.to - self.from) * t
    }

    /// Gain the ramp ends at.
    pub fn target(&self) -> f64 {
        self.to
    }

    /// Starts a new ramp from the current value to `to`.
    pub fn ramp_to(&mut self, to: f64, now: f64, duration: f64) {
        *self = Self {
            from: self.value(now),
            to,
            start: now,
            duration: duration.max(0.0),
        };
    }
}
