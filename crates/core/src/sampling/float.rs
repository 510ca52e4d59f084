//! Buoyancy of a rigid body over probe samples
//!
//! [`FlowFloat`] turns the latest samples of a set of probes attached to a
//! body into per-point accelerations, an upright torque and an angular
//! damping factor. Integrating them is left to the host physics.

use super::sample::FlowProbe;
use crate::core_types::Vec3;
use nalgebra::{Unit, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Axis the upright torque turns the body toward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TorqueMode {
    /// World up
    #[default]
    WorldUp,
    /// World up or down, whichever is closer
    WorldUpBidirectional,
    /// Strength-weighted fluid surface normal
    NormalUp,
    /// Surface normal or its opposite, whichever is closer
    NormalUpBidirectional,
}

/// One probe attached to the body
#[derive(Debug, Clone, Copy)]
pub struct FloatPoint<'a> {
    pub probe: &'a FlowProbe,
    /// Body velocity at the probe position (m/s)
    pub velocity: Vec3,
}

/// Acceleration to apply at a world position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointForce {
    pub position: Vec3,
    pub force: Vec3,
}

/// Output of one [`FlowFloat::evaluate`]
#[derive(Debug, Clone, PartialEq)]
pub struct FloatForces {
    /// Accelerations at each contributing probe
    pub points: Vec<PointForce>,
    /// Angular acceleration turning the body upright
    pub torque: Vec3,
    /// Factor to multiply the angular velocity by
    pub angular_damping: f32,
    /// Mean weighted submersion over the sampled probes
    pub submersion: f32,
}

impl FloatForces {
    /// Sum of the point accelerations
    #[must_use]
    pub fn total_force(&self) -> Vec3 {
        self.points.iter().map(|p| p.force).sum()
    }

    /// Moment of the point accelerations about `center`
    #[must_use]
    pub fn moment_about(&self, center: &Vec3) -> Vec3 {
        self.points
            .iter()
            .map(|p| (p.position - center).cross(&p.force))
            .sum()
    }
}

/// Buoyancy settings of a floating body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowFloat {
    /// 0 sinks, 1 is neutral, 2 floats
    pub buoyancy: f32,
    /// Linear drag against the fluid velocity while submerged
    pub drag: f32,
    /// Rotational drag while submerged
    pub angular_drag: f32,
    /// Strength of the upright torque
    pub torque: f32,
    pub torque_mode: TorqueMode,
    /// World gravity acceleration
    pub gravity: Vec3,
}

impl Default for FlowFloat {
    fn default() -> Self {
        Self {
            buoyancy: 1.5,
            drag: 0.0,
            angular_drag: 0.0,
            torque: 0.0,
            torque_mode: TorqueMode::WorldUp,
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

impl FlowFloat {
    /// Compute the response of a body to its probes
    ///
    /// Each sampled probe with positive strength pushes with
    /// `(-gravity * buoyancy - (velocity - fluid_velocity) * drag)`, scaled by
    /// its submersion, its overlap and its share of the total strength.
    ///
    /// # Arguments
    ///
    /// * `points` - Probes attached to the body
    /// * `body_up` - The body's current up axis in world space
    /// * `dt` - Fixed timestep in seconds
    ///
    /// # Returns
    ///
    /// `None` when no probe holds a sample
    #[must_use]
    pub fn evaluate(
        &self,
        points: &[FloatPoint<'_>],
        body_up: &Vec3,
        dt: f32,
    ) -> Option<FloatForces> {
        let sampled: Vec<&FloatPoint<'_>> =
            points.iter().filter(|p| p.probe.is_sampled()).collect();
        if sampled.is_empty() {
            return None;
        }
        let total_strength: f32 = sampled.iter().map(|p| p.probe.strength.max(0.0)).sum();
        let weighted = || {
            sampled
                .iter()
                .filter(|p| p.probe.strength > 0.0)
                .map(move |p| (*p, p.probe.strength / total_strength))
        };

        let mut submersion = 0.0;
        let mut forces = Vec::with_capacity(sampled.len());
        for (point, weight) in weighted() {
            let probe = point.probe;
            let sample = probe.sample();
            let depth_factor = probe.own_submersion();
            submersion += depth_factor * sample.overlap * weight;

            let mut force = Vec3::zeros();
            if self.buoyancy != 0.0 {
                force -= self.gravity * self.buoyancy;
            }
            if self.drag != 0.0 {
                force -= (point.velocity - sample.velocity) * self.drag;
            }
            forces.push(PointForce {
                position: probe.position,
                force: force * depth_factor * sample.overlap * weight,
            });
        }
        submersion /= sampled.len() as f32;

        let angular_damping = if self.angular_drag == 0.0 {
            1.0
        } else {
            (-self.angular_drag * self.angular_drag * submersion * dt).exp()
        };

        let torque = if self.torque == 0.0 {
            Vec3::zeros()
        } else {
            let mut axis = match self.torque_mode {
                TorqueMode::WorldUp | TorqueMode::WorldUpBidirectional => Vec3::y(),
                TorqueMode::NormalUp | TorqueMode::NormalUpBidirectional => weighted()
                    .map(|(p, weight)| p.probe.sample().normal * weight)
                    .sum::<Vec3>(),
            };
            let bidirectional = matches!(
                self.torque_mode,
                TorqueMode::WorldUpBidirectional | TorqueMode::NormalUpBidirectional
            );
            if bidirectional && body_up.dot(&axis) < 0.0 {
                axis = -axis;
            }
            upright_rotation(body_up, &axis).map_or_else(Vec3::zeros, |turn| {
                turn.imag() * submersion * self.torque
            })
        };

        Some(FloatForces {
            points: forces,
            torque,
            angular_damping,
            submersion,
        })
    }
}

/// Shortest rotation taking `from` onto `to`
///
/// Opposite axes turn half a revolution about a perpendicular axis; a zero
/// axis yields `None`.
fn upright_rotation(from: &Vec3, to: &Vec3) -> Option<UnitQuaternion<f32>> {
    if from.norm_squared() <= f32::EPSILON || to.norm_squared() <= f32::EPSILON {
        return None;
    }
    let turn = UnitQuaternion::rotation_between(from, to).unwrap_or_else(|| {
        let pivot =
            Unit::try_new(from.cross(&Vec3::x()), f32::EPSILON).unwrap_or_else(Vec3::z_axis);
        UnitQuaternion::from_axis_angle(&pivot, PI)
    });
    Some(turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{FluidSample, SampleHandler};
    use approx::assert_relative_eq;

    /// Probe at `y` over fluid whose surface sits at 1
    fn probe_at(y: f32, overlap: f32) -> FlowProbe {
        let mut probe = FlowProbe::new(Vec3::new(0.0, y, 0.0));
        probe.handle_sample(&FluidSample {
            depth: 1.0,
            normal: Vec3::y(),
            overlap,
            ..FluidSample::default()
        });
        probe
    }

    fn still(probe: &FlowProbe) -> FloatPoint<'_> {
        FloatPoint {
            probe,
            velocity: Vec3::zeros(),
        }
    }

    #[test]
    fn test_submerged_point_pushes_up() {
        let probe = probe_at(-5.0, 1.0);
        let float = FlowFloat::default();
        let out = float.evaluate(&[still(&probe)], &Vec3::y(), 0.02).unwrap();

        assert_relative_eq!(out.submersion, 1.0);
        assert_relative_eq!(out.total_force(), Vec3::new(0.0, 9.81 * 1.5, 0.0), epsilon = 1e-5);
        assert_eq!(out.torque, Vec3::zeros());
        assert_eq!(out.angular_damping, 1.0);
    }

    #[test]
    fn test_partly_submerged_point_scales_force() {
        // Surface at 1, radius 1: y = 1 is half way down the ramp
        let probe = probe_at(1.0, 1.0);
        let out = FlowFloat::default()
            .evaluate(&[still(&probe)], &Vec3::y(), 0.02)
            .unwrap();
        assert_relative_eq!(out.submersion, 0.5);
        assert_relative_eq!(out.total_force().y, 9.81 * 1.5 * 0.5, epsilon = 1e-5);

        let outside = probe_at(-5.0, 0.0);
        let out = FlowFloat::default()
            .evaluate(&[still(&outside)], &Vec3::y(), 0.02)
            .unwrap();
        assert_eq!(out.total_force(), Vec3::zeros());
    }

    #[test]
    fn test_dry_and_unsampled_points() {
        let float = FlowFloat::default();
        let unsampled = FlowProbe::new(Vec3::zeros());
        assert!(float.evaluate(&[still(&unsampled)], &Vec3::y(), 0.02).is_none());
        assert!(float.evaluate(&[], &Vec3::y(), 0.02).is_none());

        let above = probe_at(5.0, 1.0);
        let out = float.evaluate(&[still(&above)], &Vec3::y(), 0.02).unwrap();
        assert_eq!(out.submersion, 0.0);
        assert_eq!(out.total_force(), Vec3::zeros());
    }

    #[test]
    fn test_strength_weights_points() {
        let mut strong = probe_at(-5.0, 1.0);
        strong.strength = 3.0;
        strong.position.x = 1.0;
        let mut weak = probe_at(-5.0, 1.0);
        weak.position.x = -1.0;
        let mut ignored = probe_at(-5.0, 1.0);
        ignored.strength = 0.0;

        let float = FlowFloat::default();
        let out = float
            .evaluate(&[still(&strong), still(&weak), still(&ignored)], &Vec3::y(), 0.02)
            .unwrap();
        assert_eq!(out.points.len(), 2);
        assert_relative_eq!(out.points[0].force.y, 9.81 * 1.5 * 0.75, epsilon = 1e-5);
        assert_relative_eq!(out.points[1].force.y, 9.81 * 1.5 * 0.25, epsilon = 1e-5);
        // Submersion is averaged over every sampled probe
        assert_relative_eq!(out.submersion, 1.0 / 3.0, epsilon = 1e-6);
        assert!(out.moment_about(&Vec3::zeros()).z > 0.0);
    }

    #[test]
    fn test_drag_opposes_relative_velocity() {
        let probe = probe_at(-5.0, 1.0);
        let float = FlowFloat {
            buoyancy: 0.0,
            drag: 2.0,
            ..FlowFloat::default()
        };
        let moving = FloatPoint {
            probe: &probe,
            velocity: Vec3::new(1.0, 0.0, 0.0),
        };
        let out = float.evaluate(&[moving], &Vec3::y(), 0.02).unwrap();
        assert_relative_eq!(out.total_force(), Vec3::new(-2.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_angular_drag_decays_with_submersion() {
        let probe = probe_at(-5.0, 1.0);
        let float = FlowFloat {
            angular_drag: 2.0,
            ..FlowFloat::default()
        };
        let out = float.evaluate(&[still(&probe)], &Vec3::y(), 0.5).unwrap();
        assert_relative_eq!(out.angular_damping, (-2.0f32).exp(), epsilon = 1e-6);
    }

    fn torque_for(mode: TorqueMode, normal: Vec3, body_up: Vec3) -> Vec3 {
        let mut probe = FlowProbe::new(Vec3::new(0.0, -5.0, 0.0));
        probe.handle_sample(&FluidSample {
            depth: 1.0,
            normal,
            overlap: 1.0,
            ..FluidSample::default()
        });
        let float = FlowFloat {
            torque: 1.0,
            torque_mode: mode,
            ..FlowFloat::default()
        };
        float.evaluate(&[still(&probe)], &body_up, 0.02).unwrap().torque
    }

    #[test]
    fn test_world_up_torque() {
        let tilted = Vec3::new(1.0, 1.0, 0.0).normalize();
        let torque = torque_for(TorqueMode::WorldUp, Vec3::x(), tilted);
        // Turning +X+Y toward +Y is a positive rotation about Z
        assert!(torque.z > 0.0);
        assert_relative_eq!(torque.z, (PI / 8.0).sin(), epsilon = 1e-5);

        assert_relative_eq!(torque_for(TorqueMode::WorldUp, Vec3::x(), Vec3::y()), Vec3::zeros());
    }

    #[test]
    fn test_world_up_bidirectional_torque() {
        let capsized = Vec3::new(1.0, -1.0, 0.0).normalize();
        let one_way = torque_for(TorqueMode::WorldUp, Vec3::y(), capsized);
        let either = torque_for(TorqueMode::WorldUpBidirectional, Vec3::y(), capsized);
        assert!(one_way.norm() > either.norm());
        // Settles toward world down: turning +X-Y onto -Y is about -Z
        assert!(either.z < 0.0);
        assert_relative_eq!(either.norm(), (PI / 8.0).sin(), epsilon = 1e-5);
    }

    #[test]
    fn test_normal_up_torque() {
        let normal = Vec3::new(-1.0, 1.0, 0.0).normalize();
        let torque = torque_for(TorqueMode::NormalUp, normal, Vec3::y());
        assert!(torque.z > 0.0);
        assert_relative_eq!(torque.z, (PI / 8.0).sin(), epsilon = 1e-5);
        assert_eq!(torque_for(TorqueMode::WorldUp, normal, Vec3::y()), Vec3::zeros());
    }

    #[test]
    fn test_normal_up_bidirectional_torque() {
        let normal = Vec3::new(-1.0, 1.0, 0.0).normalize();
        let down = -Vec3::y();
        let one_way = torque_for(TorqueMode::NormalUp, normal, down);
        let either = torque_for(TorqueMode::NormalUpBidirectional, normal, down);
        assert_relative_eq!(one_way.norm(), (3.0 * PI / 8.0).sin(), epsilon = 1e-5);
        assert_relative_eq!(either.norm(), (PI / 8.0).sin(), epsilon = 1e-5);
    }
}
