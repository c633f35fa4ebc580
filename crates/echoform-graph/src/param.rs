//! Schedulable audio parameters.
//!
//! An [`AudioParam`] holds a base value plus a time-ordered list of events:
//! step changes and linear ramps. Values are read per sample by absolute time,
//! which makes automation sample-accurate and independent of block size.
//!
//! ## Event semantics
//!
//! - `set_value_at(v, t)`: the value becomes `v` at `t` and holds
//! - `linear_ramp_to(v, t)`: the value moves linearly from the previous
//!   event's value (or the base value) to `v`, arriving at `t`
//!
//! ```rust
//! use echoform_graph::AudioParam;
//!
//! let mut gain = AudioParam::new(1.0, 0.0, 4.0);
//! gain.set_value_at(0.0, 1.0);
//! gain.linear_ramp_to(2.0, 3.0);
//! assert_eq!(gain.value_at(0.5), 1.0);
//! assert_eq!(gain.value_at(2.0), 1.0);
//! assert_eq!(gain.value_at(10.0), 2.0);
//! ```

/// Kind of a scheduled change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Step to the value at the event time.
    Set,
    /// Ramp linearly from the previous event, arriving at the event time.
    LinearRamp,
}

/// One scheduled change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEvent {
    /// Absolute time in seconds.
    pub time: f64,
    /// Target value.
    pub value: f32,
    /// How the value gets there.
    pub kind: EventKind,
}

/// A parameter whose value can be set now or scheduled on the graph timeline.
#[derive(Debug, Clone)]
pub struct AudioParam {
    base: f32,
    min: f32,
    max: f32,
    events: Vec<ParamEvent>,
}

impl AudioParam {
    /// Creates a parameter with a range. Every value written is clamped into it.
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        Self {
            base: value.clamp(min, max),
            min,
            max,
            events: Vec::new(),
        }
    }

    /// Creates a parameter from a schema entry, starting at its default.
    pub fn from_spec(spec: &echoform_spec::ParamSpec) -> Self {
        let (min, max) = spec.range().unwrap_or((f64::MIN, f64::MAX));
        let default = spec.default_value().as_f64().unwrap_or(0.0);
        Self::new(default as f32, min as f32, max as f32)
    }

    /// Allowed range.
    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Replaces the base value. Scheduled events are kept, so an automation
    /// curve still overrides the base value from its first event on.
    pub fn set_value(&mut self, value: f32) {
        self.base = value.clamp(self.min, self.max);
    }

    /// Value before any event takes effect.
    pub fn base_value(&self) -> f32 {
        self.base
    }

    /// Scheduled events, time ordered.
    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    /// Schedules a step change.
    pub fn set_value_at(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent {
            time,
            value: value.clamp(self.min, self.max),
            kind: EventKind::Set,
        });
    }

    /// Schedules a linear ramp ending at `time`.
    pub fn linear_ramp_to(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent {
            time,
            value: value.clamp(self.min, self.max),
            kind: EventKind::LinearRamp,
        });
    }

    /// Drops the step change to `value` scheduled at `time`. Returns whether
    /// one was found.
    pub fn cancel_set_at(&mut self, value: f32, time: f64) -> bool {
        let value = value.clamp(self.min, self.max);
        let found = self
            .events
            .iter()
            .position(|e| e.kind == EventKind::Set && e.time == time && e.value == value);
        match found {
            Some(i) => {
                self.events.remove(i);
                true
            }
            None => false,
        }
    }

    /// Value at absolute time `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let next = self.events.partition_point(|e| e.time <= time);
        let (prev_time, prev_value) = if next == 0 {
            (0.0, self.base)
        } else {
            let e = &self.events[next - 1];
            (e.time, e.value)
        };

        match self.events.get(next) {
            Some(e) if e.kind == EventKind::LinearRamp => {
                let span = e.time - prev_time;
                if span <= 0.0 {
                    return e.value;
                }
                let t = ((time - prev_time) / span).clamp(0.0, 1.0) as f32;
                prev_value + (e.value - prev_value) * t
            }
            _ => prev_value,
        }
    }

    /// Whether the value can change during `[start, end)`.
    pub fn is_static_over(&self, start: f64, end: f64) -> bool {
        let next = self.events.partition_point(|e| e.time <= start);
        match self.events.get(next) {
            None => true,
            Some(e) => e.kind == EventKind::Set && e.time >= end,
        }
    }

    /// Fills `out` with per-sample values for a block starting at `start` seconds.
    pub fn fill(&self, start: f64, sample_rate: f32, out: &mut [f32]) {
        let dt = 1.0 / f64::from(sample_rate);
        let end = start + dt * out.len() as f64;
        if self.is_static_over(start, end) {
            out.fill(self.value_at(start));
            return;
        }
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.value_at(start + dt * i as f64);
        }
    }

    fn insert(&mut self, event: ParamEvent) {
        // Later events at the same time replace earlier ones of the same kind.
        let at = self.events.partition_point(|e| e.time <= event.time);
        if at > 0 {
            let last = &mut self.events[at - 1];
            if last.time == event.time && last.kind == event.kind {
                *last = event;
                return;
            }
        }
        self.events.insert(at, event);
    }
}
