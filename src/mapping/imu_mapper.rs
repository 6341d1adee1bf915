/*
 * Copyright (C) 2025 Pedro Henrique / phdev13
 *
 * File: src/mapping/imu_mapper.rs
 *
 * Mapper for the IMU slot. One pin carries the full orientation quaternion;
 * the mapper converts it to Euler angles and fans the result out over up to
 * three virtual channels (yaw, pitch, roll), each routed to its own output
 * index. Axes without a registered output index are suppressed.
 *
 * The quaternion conversion clamps near the gimbal poles: past the
 * singularity limit the pitch saturates at +/- pi/2 and roll collapses to
 * zero, which keeps asin inside its domain (see
 * euclideanspace.com/maths/geometry/rotations/conversions/quaternionToEuler).
 *
 * Dependencies:
 *   - nalgebra: quaternion input type.
 *   - log: dropped-value reporting.
 *
 * SPDX-License-Identifier: AGPL-3.0 license
 */

use std::f32::consts::FRAC_PI_2;

use log::debug;
use nalgebra::Quaternion;

use crate::message::{
    Command, CommandErrorCode, CommandPayload, ImuAxis, MessageFactory, PinType, SendingMode,
    Value,
};
use crate::output_backend::OutputBackend;

use super::{MapperParameters, SensorMapper};

/*
 * To avoid singularities near 90 degrees this must stay below 0.5;
 * 0.4995 clamps at roughly 86 degrees.
 */
pub const QUATERNION_SINGULARITY_LIMIT: f32 = 0.4995;

/// Euler angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Converts an orientation quaternion to Euler angles with a clamp at the
/// gimbal poles.
pub fn quat_to_euler(q: &Quaternion<f32>) -> EulerAngles {
    let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);
    let pole = qw * qx + qy * qz;
    if pole > QUATERNION_SINGULARITY_LIMIT {
        EulerAngles {
            yaw: 2.0 * qx.atan2(qw),
            pitch: FRAC_PI_2,
            roll: 0.0,
        }
    } else if pole < -QUATERNION_SINGULARITY_LIMIT {
        EulerAngles {
            yaw: -2.0 * qx.atan2(qw),
            pitch: -FRAC_PI_2,
            roll: 0.0,
        }
    } else {
        EulerAngles {
            yaw: (2.0 * qy * qw - 2.0 * qx * qz).atan2(1.0 - 2.0 * qy * qy - 2.0 * qz * qz),
            pitch: (2.0 * qx * qy + 2.0 * qz * qw).asin(),
            roll: (2.0 * qx * qw - 2.0 * qy * qz).atan2(1.0 - 2.0 * qx * qx - 2.0 * qz * qz),
        }
    }
}

pub struct ImuMapper {
    params: MapperParameters,
    /// Output index per axis, in `ImuAxis` order (yaw, pitch, roll).
    axis_outputs: [Option<i32>; 3],
}

impl ImuMapper {
    pub fn new(sensor_index: i32) -> Self {
        Self {
            params: MapperParameters::new(sensor_index),
            axis_outputs: [None; 3],
        }
    }

    fn axis_slot(axis: ImuAxis) -> usize {
        match axis {
            ImuAxis::Yaw => 0,
            ImuAxis::Pitch => 1,
            ImuAxis::Roll => 2,
        }
    }
}

impl SensorMapper for ImuMapper {
    fn apply_command(&mut self, cmd: &Command) -> CommandErrorCode {
        if let Some(code) = self.params.apply_common_command(cmd) {
            return code;
        }
        match *cmd.payload() {
            CommandPayload::SetImuAxisOutput { axis, output_index } => {
                if output_index < 0 {
                    return CommandErrorCode::InvalidValue;
                }
                self.axis_outputs[Self::axis_slot(axis)] = Some(output_index);
                CommandErrorCode::Ok
            }
            CommandPayload::SetSamplingRate(_) => CommandErrorCode::Ok,
            _ => CommandErrorCode::UnhandledCommandForSensorType,
        }
    }

    fn process(&mut self, value: &Value, backend: &mut dyn OutputBackend) {
        let orientation = match value {
            Value::Imu { orientation, .. } => orientation,
            other => {
                debug!(
                    "IMU mapper on pin {} ignoring non-IMU value {:?}",
                    self.params.sensor_index, other
                );
                return;
            }
        };
        if self.params.gated_off() {
            return;
        }
        if self.params.sending_mode == SendingMode::Continuous
            && !self.params.accept_continuous_sample()
        {
            return;
        }

        let angles = quat_to_euler(orientation);
        let per_axis = [
            (ImuAxis::Yaw, angles.yaw),
            (ImuAxis::Pitch, angles.pitch),
            (ImuAxis::Roll, angles.roll),
        ];
        for (axis, angle) in per_axis {
            if let Some(output_index) = self.axis_outputs[Self::axis_slot(axis)] {
                backend.send_continuous(output_index, angle);
            }
        }
    }

    fn put_config_commands_into(&self, out: &mut Vec<Command>) {
        let factory = MessageFactory::new();
        let index = self.params.sensor_index;
        out.push(factory.make_set_pin_type_command(index, PinType::ImuInput, 0));
        self.params.put_config_commands_into(out);
        for axis in [ImuAxis::Yaw, ImuAxis::Pitch, ImuAxis::Roll] {
            if let Some(output_index) = self.axis_outputs[Self::axis_slot(axis)] {
                out.push(factory.make_set_imu_axis_output_command(index, axis, output_index, 0));
            }
        }
    }

    fn pin_type(&self) -> PinType {
        PinType::ImuInput
    }
}
