//! Turns a [`FleetConfig`] into a [`Master`] of simulated robots.

use std::sync::Arc;

use botkit_hal::sim::READ_COMMAND;
use botkit_hal::{Device, SimConnection, SimDevice};
use botkit_runtime::{ERROR_EVENT, Master, Robot};
use botkit_types::{BotError, Params};
use tracing::{info, warn};

use crate::config::{FleetConfig, RobotConfig};

/// Build one robot per `[[robot]]` table and register it with a new master.
///
/// Every robot's work samples each device on its heartbeat and logs
/// anything published on the robot's error topic.
///
/// # Errors
///
/// [`BotError::Config`] for invalid heartbeats, duplicate names or devices
/// bound to unknown connections.
pub fn build(cfg: &FleetConfig) -> Result<Master, BotError> {
    let master = Master::new();
    master.set_auto_run(cfg.auto_run);
    for robot_cfg in &cfg.robots {
        let robot = build_robot(cfg, robot_cfg)?;
        master.add_robot(robot)?;
    }
    Ok(master)
}

fn build_robot(cfg: &FleetConfig, robot_cfg: &RobotConfig) -> Result<Robot, BotError> {
    let heartbeat = cfg.heartbeat_for(robot_cfg)?;

    let mut builder = Robot::builder(robot_cfg.name.clone());
    for conn in &robot_cfg.connections {
        builder = builder.connection(SimConnection::new(conn.name.clone()).with_port(conn.port.clone()));
    }
    for dev in &robot_cfg.devices {
        let mut device = SimDevice::new(dev.name.clone(), dev.connection.clone());
        if let Some(pin) = &dev.pin {
            device = device.with_pin(pin.clone());
        }
        if let Some([min, max]) = dev.range {
            device = device.with_range(min, max);
        }
        builder = builder.device(device);
    }

    let robot = builder
        .work(move |robot| {
            let name = robot.name().to_string();
            robot.on(robot.eventer(), ERROR_EVENT, move |err| {
                warn!(robot = %name, error = %err, "runtime error");
            })?;

            let name = robot.name().to_string();
            let devices: Vec<Arc<dyn Device>> = robot.devices().to_vec();
            robot.every(heartbeat, move || sample_all(&name, &devices));
            Ok(())
        })
        .build()?;
    Ok(robot)
}

fn sample_all(robot: &str, devices: &[Arc<dyn Device>]) {
    let params = Params::new();
    for device in devices {
        let reading = device
            .commander()
            .and_then(|commander| commander.execute(READ_COMMAND, &params));
        if let Some(value) = reading {
            info!(robot = %robot, device = %device.name(), value = %value, "reading");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use botkit_runtime::RobotState;
    use botkit_types::ConfigError;

    #[test]
    fn demo_fleet_builds() {
        let master = build(&FleetConfig::demo()).unwrap();
        let rover = master.robot("rover").unwrap();
        assert_eq!(rover.devices().len(), 2);
        let thermometer = rover.device("thermometer").unwrap();
        assert_eq!(thermometer.summary().pin.as_deref(), Some("A0"));
        assert!(master.auto_run());
    }

    #[test]
    fn unknown_connection_is_rejected() {
        let mut cfg = FleetConfig::demo();
        cfg.robots[0].devices.push(DeviceConfig {
            name: "ghost".to_string(),
            connection: "nowhere".to_string(),
            pin: None,
            range: None,
        });
        let err = build(&cfg).unwrap_err();
        assert!(matches!(err, BotError::Config(ConfigError::UnknownConnection { .. })));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn duplicate_robot_is_rejected() {
        let mut cfg = FleetConfig::demo();
        cfg.robots.push(cfg.robots[0].clone());
        let err = build(&cfg).unwrap_err();
        assert!(matches!(err, BotError::Config(ConfigError::DuplicateName { kind: "robot", .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_samples_devices() {
        let mut cfg = FleetConfig::demo();
        cfg.auto_run = false;
        cfg.heartbeat = "100ms".to_string();
        let master = build(&cfg).unwrap();

        master.start().await.unwrap();
        let rover = master.robot("rover").unwrap();
        assert_eq!(rover.state(), RobotState::Running);

        let mut readings = rover
            .device("thermometer")
            .unwrap()
            .eventer()
            .unwrap()
            .subscribe("reading")
            .unwrap();
        let event = readings.recv().await.unwrap();
        let value = event.data.as_f64().unwrap();
        assert!((-10.0..=40.0).contains(&value));
        assert_eq!(rover.scheduler().len(), 1);

        master.stop().await.unwrap();
        assert_eq!(rover.state(), RobotState::Stopped);
    }
}
