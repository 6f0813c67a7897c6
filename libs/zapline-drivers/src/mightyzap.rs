//! MightyZap linear actuator driver
//!
//! Register-map client for one IR Robot MightyZap servo on the RS485 bus.
//! The driver caches the device's speed and current limits on first use and
//! silently clamps requested values to them; if the limit read fails, the
//! factory defaults stand for the lifetime of the driver instance.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use zapline_protocols::modbus::{ModbusError, ModbusResult, ModbusRtuMaster};

/// Holding-register map of the MightyZap Modbus interface
/// (addresses are 40001-relative: `register = 4xxxx - 40001`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Register {
    // Non-volatile memory (EEPROM)
    ModelNumber = 0x0000,
    FirmwareVersion = 0x0001,
    ServoId = 0x0002,
    BaudRate = 0x0003,
    ProtocolType = 0x0004,
    ShortStrokeLimit = 0x0005,
    LongStrokeLimit = 0x0006,
    SpeedLimit = 0x000A,
    CurrentLimit = 0x000B,
    MinPosition = 0x000C,
    MaxPosition = 0x000D,

    // Volatile memory (RAM)
    ForceEnable = 0x0080,
    Led = 0x0081,
    GoalPosition = 0x0086,
    GoalSpeed = 0x0087,
    GoalCurrent = 0x0088,
    PresentPosition = 0x0096,
    PresentCurrent = 0x0097,
    PresentMotorRate = 0x0098,
    PresentVoltage = 0x009A,
    Moving = 0x009F,
    ActionRequest = 0x00A0,
    Restart = 0x00A5,
    FactoryReset = 0x00A6,
}

impl Register {
    pub const fn addr(self) -> u16 {
        self as u16
    }
}

/// Factory speed limit used until the device reports its own
pub const DEFAULT_SPEED_LIMIT: u16 = 1023;

/// Factory current limit (mA) used until the device reports its own
pub const DEFAULT_CURRENT_LIMIT: u16 = 1600;

/// Snapshot of the actuator's live state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorStatus {
    /// Present position (0-4095 typical, depends on stroke)
    pub position: u16,
    /// Present current draw (mA)
    pub current: u16,
    /// Supply voltage (0.1 V units)
    pub voltage: u16,
    pub moving: bool,
}

/// The three sequential writes behind [`MightyZap::set_goal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStep {
    Position,
    Speed,
    Current,
}

impl fmt::Display for GoalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalStep::Position => write!(f, "position"),
            GoalStep::Speed => write!(f, "speed"),
            GoalStep::Current => write!(f, "current"),
        }
    }
}

/// A goal command failed partway: the steps before `step` are already
/// applied on the device, `step` and everything after it are not.
#[derive(Debug, Error)]
#[error("goal write failed at {step} step")]
pub struct GoalError {
    pub step: GoalStep,
    #[source]
    pub source: ModbusError,
}

/// Driver for one MightyZap actuator
///
/// Owns only the slave address; the master session (and through it the bus)
/// is shared with every other driver on the same bus.
#[derive(Debug)]
pub struct MightyZap {
    master: Arc<ModbusRtuMaster>,
    slave_id: u8,
    speed_limit: u16,
    current_limit: u16,
    limits_cached: bool,
    /// Slave id written to the device but not yet effective - the physical
    /// actuator keeps answering at the old address until restarted
    pending_id: Option<u8>,
}

impl MightyZap {
    pub fn new(master: Arc<ModbusRtuMaster>, slave_id: u8) -> ModbusResult<Self> {
        if slave_id == 0 || slave_id > 247 {
            return Err(ModbusError::InvalidRequest(format!(
                "slave id {slave_id} out of range 1..=247"
            )));
        }
        info!("mightyZAP driver created, id={slave_id}");
        Ok(Self {
            master,
            slave_id,
            speed_limit: DEFAULT_SPEED_LIMIT,
            current_limit: DEFAULT_CURRENT_LIMIT,
            limits_cached: false,
            pending_id: None,
        })
    }

    /// Address the driver currently uses on the wire
    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    /// True after a successful [`set_id`](Self::set_id) until
    /// [`restart`](Self::restart) commits the new address
    pub fn pending_restart(&self) -> bool {
        self.pending_id.is_some()
    }

    pub fn speed_limit(&self) -> u16 {
        self.speed_limit
    }

    pub fn current_limit(&self) -> u16 {
        self.current_limit
    }

    async fn read_one(&self, reg: Register) -> ModbusResult<u16> {
        let values = self
            .master
            .read_holding_registers(self.slave_id, reg.addr(), 1)
            .await?;
        Ok(values[0])
    }

    async fn write_one(&self, reg: Register, value: u16) -> ModbusResult<()> {
        if self.pending_id.is_some() {
            warn!(
                "id={}: commanding a device with a staged id change (restart pending)",
                self.slave_id
            );
        }
        self.master
            .write_single_register(self.slave_id, reg.addr(), value)
            .await
    }

    /// Fetch the device's speed/current limits once per driver lifetime.
    /// A failed read pins the defaults permanently for this instance.
    async fn cache_limits(&mut self) {
        if self.limits_cached {
            return;
        }

        match self.read_one(Register::SpeedLimit).await {
            Ok(value) => self.speed_limit = value,
            Err(e) => {
                warn!(
                    "id={}: speed limit read failed, keeping default {}: {e}",
                    self.slave_id, self.speed_limit
                );
            },
        }
        match self.read_one(Register::CurrentLimit).await {
            Ok(value) => self.current_limit = value,
            Err(e) => {
                warn!(
                    "id={}: current limit read failed, keeping default {}: {e}",
                    self.slave_id, self.current_limit
                );
            },
        }

        self.limits_cached = true;
        info!(
            "id={}: cached limits - speed={}, current={}",
            self.slave_id, self.speed_limit, self.current_limit
        );
    }

    fn clamp_speed(&self, speed: u16) -> u16 {
        if speed > self.speed_limit {
            warn!(
                "id={}: clamping speed {speed} to limit {}",
                self.slave_id, self.speed_limit
            );
            self.speed_limit
        } else {
            speed
        }
    }

    fn clamp_current(&self, current: u16) -> u16 {
        if current > self.current_limit {
            warn!(
                "id={}: clamping current {current} to limit {}",
                self.slave_id, self.current_limit
            );
            self.current_limit
        } else {
            current
        }
    }

    pub async fn get_model(&self) -> ModbusResult<u16> {
        self.read_one(Register::ModelNumber).await
    }

    pub async fn get_firmware_version(&self) -> ModbusResult<u16> {
        self.read_one(Register::FirmwareVersion).await
    }

    /// Enable or disable motor force (torque)
    pub async fn set_force_enable(&self, enable: bool) -> ModbusResult<()> {
        debug!("id={}: force {}", self.slave_id, if enable { "ON" } else { "OFF" });
        self.write_one(Register::ForceEnable, u16::from(enable)).await
    }

    pub async fn set_position(&self, position: u16) -> ModbusResult<()> {
        debug!("id={}: set position={position}", self.slave_id);
        self.write_one(Register::GoalPosition, position).await
    }

    /// Set goal speed, clamped to the cached device limit
    pub async fn set_speed(&mut self, speed: u16) -> ModbusResult<()> {
        self.cache_limits().await;
        let speed = self.clamp_speed(speed);
        debug!("id={}: set speed={speed}", self.slave_id);
        self.write_one(Register::GoalSpeed, speed).await
    }

    /// Set goal current (force control), clamped to the cached device limit
    pub async fn set_current(&mut self, current: u16) -> ModbusResult<()> {
        self.cache_limits().await;
        let current = self.clamp_current(current);
        debug!("id={}: set current={current}", self.slave_id);
        self.write_one(Register::GoalCurrent, current).await
    }

    /// Set position, speed and current as three sequential register writes.
    ///
    /// The device protocol has no transactional multi-value command for this
    /// layout, so the sequence is **not atomic**: on error the returned
    /// [`GoalError`] names the failing step, the earlier steps are already
    /// applied on the device, and the later ones were never attempted.
    pub async fn set_goal(
        &mut self,
        position: u16,
        speed: u16,
        current: u16,
    ) -> Result<(), GoalError> {
        self.cache_limits().await;
        let speed = self.clamp_speed(speed);
        let current = self.clamp_current(current);

        debug!(
            "id={}: set goal pos={position}, spd={speed}, cur={current}",
            self.slave_id
        );

        self.write_one(Register::GoalPosition, position)
            .await
            .map_err(|source| GoalError {
                step: GoalStep::Position,
                source,
            })?;
        self.write_one(Register::GoalSpeed, speed)
            .await
            .map_err(|source| GoalError {
                step: GoalStep::Speed,
                source,
            })?;
        self.write_one(Register::GoalCurrent, current)
            .await
            .map_err(|source| GoalError {
                step: GoalStep::Current,
                source,
            })
    }

    pub async fn get_position(&self) -> ModbusResult<u16> {
        self.read_one(Register::PresentPosition).await
    }

    /// Read position, current, voltage and moving state.
    ///
    /// Position, current and voltage share one contiguous 5-register block;
    /// the moving flag sits apart and needs its own read. Both reads are
    /// fully validated by the master; if either fails the whole call fails
    /// and no partial status is returned.
    pub async fn get_status(&self) -> ModbusResult<ActuatorStatus> {
        let block = self
            .master
            .read_holding_registers(self.slave_id, Register::PresentPosition.addr(), 5)
            .await?;
        let moving = self.read_one(Register::Moving).await? != 0;

        Ok(ActuatorStatus {
            position: block[0],
            current: block[1],
            // block[2] is the motor operating rate, block[3] is reserved
            voltage: block[4],
            moving,
        })
    }

    pub async fn is_moving(&self) -> ModbusResult<bool> {
        Ok(self.read_one(Register::Moving).await? != 0)
    }

    /// LED control (0=off, 1=on; blink codes vary by model)
    pub async fn set_led(&self, state: u8) -> ModbusResult<()> {
        self.write_one(Register::Led, u16::from(state)).await
    }

    /// Stage a new slave id.
    ///
    /// The id register is written at the current address and the change is
    /// only staged here: the physical device keeps answering at the old
    /// address until it restarts, so the driver keeps using it too.
    /// [`restart`](Self::restart) commits the staged id.
    pub async fn set_id(&mut self, new_id: u8) -> ModbusResult<()> {
        if new_id == 0 || new_id > 247 {
            return Err(ModbusError::InvalidRequest(format!(
                "slave id {new_id} out of range 1..=247"
            )));
        }

        self.master
            .write_single_register(self.slave_id, Register::ServoId.addr(), u16::from(new_id))
            .await?;

        info!(
            "id change staged: {} -> {new_id} (restart required)",
            self.slave_id
        );
        self.pending_id = Some(new_id);
        Ok(())
    }

    /// Restart the actuator. Commits a staged id change once the restart
    /// write is acknowledged.
    pub async fn restart(&mut self) -> ModbusResult<()> {
        info!("id={}: restarting actuator", self.slave_id);
        self.master
            .write_single_register(self.slave_id, Register::Restart.addr(), 1)
            .await?;

        if let Some(new_id) = self.pending_id.take() {
            info!("id={}: live address now {new_id}", self.slave_id);
            self.slave_id = new_id;
        }
        Ok(())
    }

    /// Restore the device's factory settings
    pub async fn factory_reset(&self) -> ModbusResult<()> {
        warn!("id={}: factory reset!", self.slave_id);
        self.write_one(Register::FactoryReset, 1).await
    }
}
