use log::warn;
use nalgebra::{Matrix4, Vector4};

use crate::history::History;

/// Observation noise coefficient. Deliberately large: single-frame
/// centroid measurements of a small blob jitter by several pixels.
pub const OBSERVATION_NOISE: f32 = 20.0;

const DEFAULT_DT: f32 = 0.5;
const STATE_HISTORY_CAP: usize = 1024;

/// Constant-velocity Kalman filter over `(x, y, vx, vy)`.
///
/// The observation matrix is the identity: velocity is not measured
/// directly but derived from consecutive positions and fed back as part
/// of the measurement vector. Exactly one of [`update_measurement`] or
/// [`update_missing`] must run before each [`update_filter`] call;
/// skipping that step silently reuses the previous measurement.
///
/// [`update_measurement`]: PositionFilter::update_measurement
/// [`update_missing`]: PositionFilter::update_missing
/// [`update_filter`]: PositionFilter::update_filter
#[derive(Debug, Clone)]
pub struct PositionFilter {
    transition: Matrix4<f32>,
    process_noise: Matrix4<f32>,
    observation_noise: Matrix4<f32>,
    covariance: Matrix4<f32>,
    measurement: Vector4<f32>,
    states: History<Vector4<f32>>,
    running: bool,
}

impl PositionFilter {
    pub fn new() -> Self {
        let mut f = Self {
            transition: Matrix4::identity(),
            process_noise: Matrix4::identity(),
            observation_noise: Matrix4::identity() * OBSERVATION_NOISE,
            covariance: Matrix4::identity(),
            measurement: Vector4::new(1.0, 1.0, 1.0, 1.0),
            states: History::with_capacity(STATE_HISTORY_CAP),
            running: false,
        };
        f.start();
        f
    }

    /// Reset to a fresh filter with no prior state.
    pub fn start(&mut self) {
        self.transition = Matrix4::identity();
        self.set_dt(DEFAULT_DT);
        self.covariance = Matrix4::identity();
        self.measurement = Vector4::new(1.0, 1.0, 1.0, 1.0);
        self.states.clear();
        self.running = true;
    }

    /// Release filter state; unusable until [`start`](Self::start).
    pub fn stop(&mut self) {
        self.states.clear();
        self.running = false;
    }

    #[inline]
    fn set_dt(&mut self, dt: f32) {
        self.transition[(0, 2)] = dt;
        self.transition[(1, 3)] = dt;
    }

    /// Feed a detected position. The first call seeds the filter state
    /// directly; later calls derive the velocity from the previous
    /// filtered position over `dt` (falling back to 1 when `dt <= 0`).
    pub fn update_measurement(&mut self, x: f32, y: f32, dt: f32) {
        if !self.running {
            return;
        }

        match self.states.latest().copied() {
            None => {
                let seed = Vector4::new(x, y, 1.0, 1.0);
                self.states.push(seed);
                self.measurement = seed;
            }
            Some(last) => {
                let (vx, vy) = if dt > 0.0 {
                    ((x - last.x) / dt, (y - last.y) / dt)
                } else {
                    (1.0, 1.0)
                };
                if dt > 0.0 {
                    self.set_dt(dt);
                }
                self.measurement = Vector4::new(x, y, vx, vy);
            }
        }
    }

    /// No detection this frame: coast on the model by reusing the last
    /// filtered state as the measurement. The covariance is not inflated
    /// for consecutive misses; see DESIGN.md.
    pub fn update_missing(&mut self) {
        if let Some(last) = self.states.latest() {
            self.measurement = *last;
        }
    }

    /// Advance one predict/update step against the current measurement.
    /// Returns the filtered position, ceiled to whole pixels, and appends
    /// the full state to the filtered history.
    pub fn update_filter(&mut self) -> Option<(f32, f32)> {
        if !self.running {
            return None;
        }
        let prior = *self.states.latest()?;

        // predict
        let predicted = self.transition * prior;
        let p_pred = self.transition * self.covariance * self.transition.transpose()
            + self.process_noise;

        // update, H = I
        let innovation_cov = p_pred + self.observation_noise;
        let gain = match innovation_cov.try_inverse() {
            Some(inv) => p_pred * inv,
            None => {
                warn!("singular innovation covariance, coasting on prediction");
                self.states.push(predicted);
                self.covariance = p_pred;
                return Some((predicted.x.ceil(), predicted.y.ceil()));
            }
        };

        let state = predicted + gain * (self.measurement - predicted);
        self.covariance = (Matrix4::identity() - gain) * p_pred;
        self.states.push(state);

        Some((state.x.ceil(), state.y.ceil()))
    }

    /// Latest filtered state, if any.
    #[inline]
    pub fn state(&self) -> Option<&Vector4<f32>> {
        self.states.latest()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for PositionFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_measurement_seeds_state() {
        let mut f = PositionFilter::new();
        f.update_measurement(100.0, 50.0, 0.5);
        let s = f.state().unwrap();
        assert_eq!((s.x, s.y, s.z, s.w), (100.0, 50.0, 1.0, 1.0));
    }

    #[test]
    fn repeated_measurements_converge() {
        let mut f = PositionFilter::new();
        f.update_measurement(50.0, 80.0, 0.5);
        f.update_filter();

        for _ in 0..200 {
            f.update_measurement(50.0, 80.0, 0.5);
            f.update_filter();
        }

        let s = f.state().unwrap();
        assert!((s.x - 50.0).abs() < 1.0, "x drifted: {}", s.x);
        assert!((s.y - 80.0).abs() < 1.0, "y drifted: {}", s.y);
        assert!(s.z.abs() < 0.2, "vx did not settle: {}", s.z);
        assert!(s.w.abs() < 0.2, "vy did not settle: {}", s.w);
    }

    #[test]
    fn missing_update_coasts() {
        let mut f = PositionFilter::new();
        f.update_measurement(10.0, 10.0, 0.5);
        f.update_filter();
        f.update_measurement(20.0, 10.0, 0.5);
        f.update_filter();

        let before = *f.state().unwrap();
        f.update_missing();
        let pos = f.update_filter().unwrap();

        // moving right: the coasted prediction keeps moving right
        assert!(pos.0 >= before.x.ceil());
        assert!((f.state().unwrap().y - before.y).abs() < 1.0);
    }

    #[test]
    fn zero_dt_velocity_fallback() {
        let mut f = PositionFilter::new();
        f.update_measurement(10.0, 10.0, 0.5);
        f.update_filter();
        // dt <= 0 must not divide; velocity falls back to 1
        f.update_measurement(11.0, 10.0, 0.0);
        assert!(f.update_filter().is_some());
    }

    #[test]
    fn stopped_filter_is_inert() {
        let mut f = PositionFilter::new();
        f.update_measurement(10.0, 10.0, 0.5);
        f.update_filter();
        f.stop();
        assert_eq!(f.update_filter(), None);
        assert!(f.state().is_none());
    }
}
