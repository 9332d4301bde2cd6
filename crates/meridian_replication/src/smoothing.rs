//! # Avatar Smoothing
//!
//! Client-side presentation filter for remote avatars. State updates
//! arrive in bursts at the send rate; rendering happens every frame.
//! The smoother bridges the gap, either trailing the last update on a
//! short interpolation window or extrapolating ahead of it along the
//! observed velocity.

use crate::config::SyncConfig;
use meridian_shared::math::{Quaternion, Vec3};

// Extrapolation overshoots real elapsed time by this factor
const PREDICTION_LEAD: f32 = 1.5;
// Per-advance blend toward the predicted position
const PREDICTION_BLEND: f32 = 0.8;
// Convergence rate of the interpolation window, per second
const INTERPOLATION_RATE: f32 = 12.0;
// Interpolation trails the update by half the observed velocity
const VELOCITY_LEAD: f32 = 0.5;

/// Presentation filter for one remote avatar.
#[derive(Clone, Copy, Debug, Default)]
pub struct AvatarSmoother {
    last_position: Vec3,
    velocity: Vec3,
    elapsed: f32,
    display_position: Vec3,
    display_rotation: Quaternion,
    target_rotation: Quaternion,
    initialized: bool,
}

impl AvatarSmoother {
    /// Creates an uninitialized smoother. The first observation snaps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one received state update. `dt_since_last` is the time
    /// since the previous update for this avatar.
    pub fn observe(&mut self, position: Vec3, rotation: Quaternion, dt_since_last: f32) {
        if self.initialized && dt_since_last > 0.0 {
            self.velocity = (position - self.last_position) / dt_since_last;
        } else {
            self.velocity = Vec3::ZERO;
            self.display_position = position;
            self.display_rotation = rotation;
            self.initialized = true;
        }
        self.last_position = position;
        self.target_rotation = rotation;
        self.elapsed = 0.0;
    }

    /// Advances presentation by one frame and returns what to draw.
    pub fn advance(&mut self, dt: f32, config: &SyncConfig) -> (Vec3, Quaternion) {
        if !self.initialized {
            return (self.display_position, self.display_rotation);
        }
        self.elapsed += dt;

        if config.prediction_enabled {
            let predicted =
                self.last_position + self.velocity * (self.elapsed * PREDICTION_LEAD);
            self.display_position = self.display_position.lerp(predicted, PREDICTION_BLEND);
        } else if config.interpolation_enabled {
            let target = self.last_position + self.velocity * (self.elapsed * VELOCITY_LEAD);
            let t = (dt * INTERPOLATION_RATE).clamp(0.0, 1.0);
            self.display_position = self.display_position.lerp(target, t);
        } else {
            self.display_position = self.last_position;
            self.display_rotation = self.target_rotation;
            return (self.display_position, self.display_rotation);
        }

        let t = (dt * INTERPOLATION_RATE).clamp(0.0, 1.0);
        self.display_rotation = self.display_rotation.slerp(self.target_rotation, t);
        (self.display_position, self.display_rotation)
    }

    /// Velocity estimated from the last two observations.
    #[must_use]
    pub const fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaw_90() -> Quaternion {
        // 90 degrees around Y
        Quaternion::new(0.0, std::f32::consts::FRAC_1_SQRT_2, 0.0, std::f32::consts::FRAC_1_SQRT_2)
    }

    #[test]
    fn test_first_observation_snaps() {
        let mut smoother = AvatarSmoother::new();
        smoother.observe(Vec3::new(100.0, 5.0, -20.0), Quaternion::IDENTITY, 0.1);

        let (position, _) = smoother.advance(0.016, &SyncConfig::default());
        assert_eq!(position, Vec3::new(100.0, 5.0, -20.0));
    }

    #[test]
    fn test_interpolation_trails_the_update() {
        let mut smoother = AvatarSmoother::new();
        let config = SyncConfig::default();
        smoother.observe(Vec3::ZERO, Quaternion::IDENTITY, 0.1);
        smoother.observe(Vec3::new(10.0, 0.0, 0.0), Quaternion::IDENTITY, 0.1);

        let (position, _) = smoother.advance(0.016, &config);
        assert!(position.x > 0.0);
        assert!(position.x < 10.0);
    }

    #[test]
    fn test_prediction_leads_the_update() {
        let mut smoother = AvatarSmoother::new();
        let config = SyncConfig {
            prediction_enabled: true,
            ..SyncConfig::default()
        };
        smoother.observe(Vec3::ZERO, Quaternion::IDENTITY, 0.1);
        smoother.observe(Vec3::new(10.0, 0.0, 0.0), Quaternion::IDENTITY, 0.1);

        let (position, _) = smoother.advance(0.1, &config);
        assert!(position.x > 10.0);
    }

    #[test]
    fn test_smoothing_off_snaps_to_updates() {
        let mut smoother = AvatarSmoother::new();
        let config = SyncConfig {
            interpolation_enabled: false,
            prediction_enabled: false,
            ..SyncConfig::default()
        };
        smoother.observe(Vec3::ZERO, yaw_90(), 0.1);
        smoother.observe(Vec3::new(10.0, 0.0, 0.0), yaw_90(), 0.1);

        let (position, rotation) = smoother.advance(0.016, &config);
        assert_eq!(position, Vec3::new(10.0, 0.0, 0.0));
        assert!(rotation.dot(yaw_90()) > 0.999);
    }

    #[test]
    fn test_rotation_converges_on_target() {
        let mut smoother = AvatarSmoother::new();
        let config = SyncConfig::default();
        smoother.observe(Vec3::ZERO, Quaternion::IDENTITY, 0.1);
        smoother.observe(Vec3::ZERO, yaw_90(), 0.1);

        let mut rotation = Quaternion::IDENTITY;
        for _ in 0..200 {
            rotation = smoother.advance(0.016, &config).1;
        }
        assert!(rotation.dot(yaw_90()).abs() > 0.999);
    }

    #[test]
    fn test_velocity_from_observations() {
        let mut smoother = AvatarSmoother::new();
        smoother.observe(Vec3::ZERO, Quaternion::IDENTITY, 0.1);
        smoother.observe(Vec3::new(5.0, 0.0, 0.0), Quaternion::IDENTITY, 0.5);

        assert_eq!(smoother.velocity(), Vec3::new(10.0, 0.0, 0.0));
    }
}
