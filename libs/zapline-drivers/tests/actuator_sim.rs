//! Actuator driver integration tests against the simulated slave

use std::sync::Arc;
use std::time::Duration;

use zapline_comlink::{BusLink, SerialChannel};
use zapline_drivers::mightyzap::{GoalStep, MightyZap, Register};
use zapline_protocols::modbus::sim::{SimFault, SimSlave};
use zapline_protocols::modbus::{
    ExceptionCode, ModbusError, ModbusRtuMaster, FC_READ_HOLDING_REGISTERS,
    FC_WRITE_SINGLE_REGISTER,
};

const ID: u8 = 1;

fn setup() -> (MightyZap, Arc<ModbusRtuMaster>, SimSlave) {
    let (link, peer) = BusLink::memory(512);
    let channel = Arc::new(SerialChannel::with_link(link, "simbus", 57600));
    let sim = SimSlave::spawn(ID, peer);
    let master = Arc::new(ModbusRtuMaster::with_timeout(
        channel,
        Duration::from_millis(50),
    ));
    let driver = MightyZap::new(master.clone(), ID).expect("valid slave id");
    (driver, master, sim)
}

#[tokio::test]
async fn speed_clamped_to_cached_device_limit_on_the_wire() {
    let (mut driver, _master, sim) = setup();
    sim.set_register(Register::SpeedLimit.addr(), 1023);
    sim.set_register(Register::CurrentLimit.addr(), 1600);

    driver.set_speed(2000).await.expect("write should succeed");

    // The frame that reached the device carried the clamped value
    assert_eq!(sim.write_log(), vec![(Register::GoalSpeed.addr(), 1023)]);
}

#[tokio::test]
async fn limits_are_fetched_once_and_memoized() {
    let (mut driver, _master, sim) = setup();
    sim.set_register(Register::SpeedLimit.addr(), 800);
    sim.set_register(Register::CurrentLimit.addr(), 900);

    driver.set_speed(1000).await.expect("write should succeed");
    assert_eq!(driver.speed_limit(), 800);

    // Changing the device register after the first fetch has no effect:
    // the cache is per driver lifetime
    sim.set_register(Register::SpeedLimit.addr(), 10);
    driver.set_speed(700).await.expect("write should succeed");

    let writes = sim.write_log();
    assert_eq!(writes.last(), Some(&(Register::GoalSpeed.addr(), 700)));
}

#[tokio::test]
async fn failed_limit_read_pins_defaults_permanently() {
    let (mut driver, _master, sim) = setup();
    sim.fail_register(
        FC_READ_HOLDING_REGISTERS,
        Register::SpeedLimit.addr(),
        SimFault::Exception(0x02),
    );
    sim.fail_register(
        FC_READ_HOLDING_REGISTERS,
        Register::CurrentLimit.addr(),
        SimFault::Exception(0x02),
    );

    driver.set_current(2000).await.expect("write should succeed");
    assert_eq!(driver.speed_limit(), 1023);
    assert_eq!(driver.current_limit(), 1600);
    assert_eq!(sim.write_log(), vec![(Register::GoalCurrent.addr(), 1600)]);

    // Even with the device readable again, the defaults stand
    sim.clear_faults();
    sim.set_register(Register::SpeedLimit.addr(), 500);
    driver.set_speed(600).await.expect("write should succeed");
    assert_eq!(driver.speed_limit(), 1023);
}

#[tokio::test]
async fn set_goal_writes_position_speed_current_in_order() {
    let (mut driver, _master, sim) = setup();
    sim.set_register(Register::SpeedLimit.addr(), 1023);
    sim.set_register(Register::CurrentLimit.addr(), 1600);

    driver
        .set_goal(2048, 512, 800)
        .await
        .expect("goal should succeed");

    assert_eq!(
        sim.write_log(),
        vec![
            (Register::GoalPosition.addr(), 2048),
            (Register::GoalSpeed.addr(), 512),
            (Register::GoalCurrent.addr(), 800),
        ]
    );
}

#[tokio::test]
async fn set_goal_partial_failure_stops_the_sequence() {
    let (mut driver, _master, sim) = setup();
    sim.set_register(Register::SpeedLimit.addr(), 1023);
    sim.set_register(Register::CurrentLimit.addr(), 1600);
    sim.fail_register(
        FC_WRITE_SINGLE_REGISTER,
        Register::GoalSpeed.addr(),
        SimFault::Exception(0x06),
    );

    let err = driver
        .set_goal(100, 200, 300)
        .await
        .expect_err("speed write should fail");

    assert_eq!(err.step, GoalStep::Speed);
    assert_eq!(
        err.source,
        ModbusError::Exception(ExceptionCode::SlaveDeviceBusy)
    );

    // First write applied, third never attempted
    assert_eq!(sim.write_log(), vec![(Register::GoalPosition.addr(), 100)]);
}

#[tokio::test]
async fn get_status_composes_block_and_moving_reads() {
    let (driver, _master, sim) = setup();
    sim.set_register(Register::PresentPosition.addr(), 1500);
    sim.set_register(Register::PresentCurrent.addr(), 120);
    sim.set_register(Register::PresentVoltage.addr(), 121);
    sim.set_register(Register::Moving.addr(), 1);

    let status = driver.get_status().await.expect("status should succeed");
    assert_eq!(status.position, 1500);
    assert_eq!(status.current, 120);
    assert_eq!(status.voltage, 121);
    assert!(status.moving);
}

#[tokio::test]
async fn get_status_fails_whole_when_a_sub_read_fails() {
    let (driver, _master, sim) = setup();
    sim.set_register(Register::PresentPosition.addr(), 1500);
    sim.fail_register(
        FC_READ_HOLDING_REGISTERS,
        Register::Moving.addr(),
        SimFault::Exception(0x04),
    );

    let err = driver.get_status().await.expect_err("status should fail");
    assert_eq!(
        err,
        ModbusError::Exception(ExceptionCode::SlaveDeviceFailure)
    );
}

#[tokio::test]
async fn set_id_stages_until_restart_commits() {
    let (mut driver, _master, sim) = setup();

    driver.set_id(7).await.expect("id write should succeed");
    assert!(driver.pending_restart());
    // The wire address is unchanged until the device restarts
    assert_eq!(driver.slave_id(), 1);
    assert_eq!(sim.register(Register::ServoId.addr()), Some(7));

    // Commands during the pending window still reach the old address
    driver.set_led(1).await.expect("led write should succeed");

    driver.restart().await.expect("restart should succeed");
    assert!(!driver.pending_restart());
    assert_eq!(driver.slave_id(), 7);
}

#[tokio::test]
async fn model_read_and_moving_flag() {
    let (driver, _master, sim) = setup();
    sim.set_register(Register::ModelNumber.addr(), 0x0417);

    assert_eq!(driver.get_model().await.expect("model read"), 0x0417);
    assert!(!driver.is_moving().await.expect("moving read"));

    sim.set_register(Register::Moving.addr(), 1);
    assert!(driver.is_moving().await.expect("moving read"));
}

#[tokio::test]
async fn force_enable_and_factory_reset_hit_their_registers() {
    let (driver, _master, sim) = setup();

    driver.set_force_enable(true).await.expect("force on");
    driver.factory_reset().await.expect("factory reset");

    assert_eq!(
        sim.write_log(),
        vec![
            (Register::ForceEnable.addr(), 1),
            (Register::FactoryReset.addr(), 1),
        ]
    );
}

#[tokio::test]
async fn invalid_ids_rejected() {
    let (_driver, master, _sim) = setup();

    assert!(MightyZap::new(master.clone(), 0).is_err());
    assert!(MightyZap::new(master.clone(), 248).is_err());

    let mut driver = MightyZap::new(master, 5).expect("valid slave id");
    assert!(driver.set_id(0).await.is_err());
    assert!(driver.set_id(248).await.is_err());
}
