mod common;

use bme280_mux::eh1::i2c::ErrorKind;
use bme280_mux::{
    i2c1, Address, Bme280, Channel, Error, Interface, Mode, Options, Poll, State, NUM_CHANNELS,
};
use common::{
    fetch_transactions, init_transactions, init_transactions_with, Delays, ManualClock, ADDR,
    DATA_A, DATA_B,
};
use core::time::Duration;
use ehm::eh1::i2c::{Mock, Transaction};

type Driver = Bme280<i2c1::Bme280Bus<Mock>, Delays, ManualClock>;

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.005
}

fn driver(expectations: &[Transaction], options: Options) -> (Driver, Delays, ManualClock) {
    let delay: Delays = Delays::default();
    let clock: ManualClock = ManualClock::default();
    let bme: Driver = Bme280::from_i2c1(
        Mock::new(expectations),
        Address::SdoGnd,
        delay.clone(),
        clock.clone(),
        options,
    );
    (bme, delay, clock)
}

#[test]
fn metadata_without_bus_access() {
    let (bme, _, _) = driver(&[], Options::DEFAULT.set_name("attic").set_bus(2));
    assert_eq!(bme.name(), "attic");
    assert_eq!(bme.kind(), "sensor");
    assert_eq!(bme.version(), env!("CARGO_PKG_VERSION"));
    assert_eq!(bme.bus_index(), 2);
    assert_eq!(bme.address(), ADDR);
    assert_eq!(bme.interface(), Interface::I2c);
    assert_eq!(bme.mux_address(), None);
    assert_eq!(bme.num_values(), NUM_CHANNELS);
    assert_eq!(bme.state(), State::Unverified);
    assert!(!bme.is_active());

    let names: Vec<&str> = (0..NUM_CHANNELS).map(|i| bme.name_at(i).unwrap()).collect();
    assert_eq!(names, ["pressure", "temperature", "humidity"]);
    for i in 0..NUM_CHANNELS {
        assert_eq!(bme.type_at(i), Ok("float"));
    }
    assert_eq!(bme.name_at(3), Err(Error::IndexOutOfRange(3)));
    assert_eq!(bme.type_at(7), Err(Error::IndexOutOfRange(7)));

    bme.free().free().done();
}

#[test]
fn init_reaches_active() {
    let (mut bme, delay, _) = driver(&init_transactions(), Options::DEFAULT);
    assert_eq!(bme.init(), Ok(()));
    assert_eq!(bme.state(), State::Active);
    assert!(bme.is_active());
    assert_eq!(bme.mode(), Mode::Forced);

    let cal = bme.calibration().unwrap();
    assert_eq!(cal.t1, 27504);
    assert_eq!(cal.p1, 36477);
    assert_eq!(cal.h1, 75);
    assert_eq!(cal.h4, 313);
    assert_eq!(cal.h5, 50);

    // reset settle only, calibration was ready on the first poll
    assert_eq!(delay.calls(), 1);
    assert_eq!(delay.total(), Poll::DEFAULT.reset_settle);

    let sample = bme.cached();
    assert!(sample.pressure.is_nan());
    assert!(sample.temperature.is_nan());
    assert!(sample.humidity.is_nan());

    bme.free().free().done();
}

#[test]
fn chip_id_mismatch_fails() {
    let expectations = [
        Transaction::write_read(ADDR, vec![0xD0], vec![0x58]),
        Transaction::write_read(ADDR, vec![0xD0], vec![0x58]),
        Transaction::write_read(ADDR, vec![0xD0], vec![0x58]),
    ];
    let (mut bme, delay, _) = driver(&expectations, Options::DEFAULT);
    assert_eq!(bme.init(), Err(Error::ChipId(0x58)));
    assert_eq!(bme.state(), State::Failed);
    assert!(!bme.is_active());
    assert!(bme.calibration().is_none());
    assert_eq!(delay.calls(), 2);
    assert_eq!(delay.total(), Poll::DEFAULT.chip_id_backoff * 2);

    // no bus access once failed
    assert_eq!(bme.value_at(0), Err(Error::NotActive));
    assert_eq!(bme.sample(), Err(Error::NotActive));

    bme.free().free().done();
}

#[test]
fn chip_id_retry_recovers() {
    let mut expectations = vec![
        Transaction::write_read(ADDR, vec![0xD0], vec![0x00]).with_error(ErrorKind::Other),
    ];
    expectations.extend(init_transactions());
    let (mut bme, delay, _) = driver(&expectations, Options::DEFAULT);
    assert_eq!(bme.init(), Ok(()));
    assert!(bme.is_active());
    assert_eq!(
        delay.total(),
        Poll::DEFAULT.chip_id_backoff + Poll::DEFAULT.reset_settle
    );
    bme.free().free().done();
}

#[test]
fn bus_error_during_calibration() {
    let expectations = [
        Transaction::write_read(ADDR, vec![0xD0], vec![0x60]),
        Transaction::write(ADDR, vec![0xE0, 0xB6]),
        Transaction::write_read(ADDR, vec![0x88], vec![0; 26]).with_error(ErrorKind::Other),
    ];
    let (mut bme, _, _) = driver(&expectations, Options::DEFAULT);
    assert_eq!(bme.init(), Err(Error::Bus(ErrorKind::Other)));
    assert_eq!(bme.state(), State::Failed);
    assert!(bme.calibration().is_none());
    bme.free().free().done();
}

#[test]
fn calibration_wait_times_out() {
    let poll = Poll {
        calibration_polls: 3,
        ..Poll::DEFAULT
    };
    let mut expectations = init_transactions();
    expectations.pop();
    for _ in 0..4 {
        expectations.push(Transaction::write_read(ADDR, vec![0xF3], vec![0x01]));
    }
    let (mut bme, delay, _) = driver(&expectations, Options::DEFAULT.set_poll(poll));
    assert_eq!(bme.init(), Err(Error::Timeout));
    assert_eq!(bme.state(), State::Failed);
    assert_eq!(
        delay.total(),
        Poll::DEFAULT.reset_settle + Poll::DEFAULT.calibration_interval * 3
    );
    bme.free().free().done();
}

#[test]
fn calibration_wait_polls_until_ready() {
    let mut expectations = init_transactions();
    let ready = expectations.pop().unwrap();
    expectations.push(Transaction::write_read(ADDR, vec![0xF3], vec![0x01]));
    expectations.push(Transaction::write_read(ADDR, vec![0xF3], vec![0x09]));
    expectations.push(ready);
    let (mut bme, delay, _) = driver(&expectations, Options::DEFAULT);
    assert_eq!(bme.init(), Ok(()));
    assert_eq!(delay.calls(), 3);
    bme.free().free().done();
}

#[test]
fn not_active_before_init() {
    let (mut bme, _, _) = driver(&[], Options::DEFAULT);
    assert_eq!(bme.value(Channel::Pressure), Err(Error::NotActive));
    assert_eq!(bme.value_by_name("humidity"), Err(Error::NotActive));
    assert_eq!(bme.refresh(), Err(Error::NotActive));
    bme.free().free().done();
}

#[test]
fn invalid_parameters_skip_the_bus() {
    let (mut bme, _, _) = driver(&init_transactions(), Options::DEFAULT);
    bme.init().unwrap();
    assert_eq!(bme.value_at(3), Err(Error::IndexOutOfRange(3)));
    assert_eq!(bme.value_by_name("altitude"), Err(Error::UnknownParameter));
    bme.free().free().done();
}

#[test]
fn fetch_uses_cache() {
    let mut expectations = init_transactions();
    expectations.extend(fetch_transactions(DATA_A));
    let (mut bme, _, clock) = driver(&expectations, Options::DEFAULT);
    bme.init().unwrap();

    let temperature = bme.value_at(1).unwrap();
    assert!(close(temperature, 25.1));

    clock.advance(Duration::from_millis(9_999));
    assert!(close(bme.value_at(0).unwrap(), 1006.53));
    assert!(close(bme.value_by_name("humidity").unwrap(), 39.9));
    assert!(close(bme.value(Channel::Temperature).unwrap(), 25.1));

    let sample = bme.sample().unwrap();
    assert_eq!(sample, bme.cached());
    assert!((300.0..=1100.0).contains(&sample.pressure));
    assert!((-40.0..=85.0).contains(&sample.temperature));
    assert!((0.0..=100.0).contains(&sample.humidity));

    bme.free().free().done();
}

#[test]
fn fetch_after_refresh_interval() {
    let mut expectations = init_transactions();
    expectations.extend(fetch_transactions(DATA_A));
    expectations.extend(fetch_transactions(DATA_B));
    let (mut bme, _, clock) = driver(&expectations, Options::DEFAULT);
    bme.init().unwrap();

    assert!(close(bme.value(Channel::Temperature).unwrap(), 25.1));
    clock.advance(Options::DEFAULT.refresh);

    let sample = bme.sample().unwrap();
    assert!(close(sample.temperature, 27.7));
    assert!(close(sample.pressure, 1048.68));
    assert!(close(sample.humidity, 48.7));

    bme.free().free().done();
}

#[test]
fn normal_mode_reads_without_trigger() {
    let options = Options::DEFAULT.set_mode(Mode::Normal);
    let mut expectations = init_transactions_with(0x27);
    expectations.push(Transaction::write_read(ADDR, vec![0xF7], DATA_A.to_vec()));
    let (mut bme, _, _) = driver(&expectations, options);
    bme.init().unwrap();
    assert_eq!(bme.mode(), Mode::Normal);
    assert!(close(bme.value(Channel::Pressure).unwrap(), 1006.53));
    bme.free().free().done();
}

#[test]
fn measuring_poll_waits_for_conversion() {
    let mut expectations = init_transactions();
    expectations.extend([
        Transaction::write(ADDR, vec![0xF4, 0x25]),
        Transaction::write_read(ADDR, vec![0xF3], vec![0x08]),
        Transaction::write_read(ADDR, vec![0xF3], vec![0x08]),
        Transaction::write_read(ADDR, vec![0xF3], vec![0x00]),
        Transaction::write_read(ADDR, vec![0xF7], DATA_A.to_vec()),
    ]);
    let (mut bme, delay, _) = driver(&expectations, Options::DEFAULT);
    bme.init().unwrap();
    let before = delay.total();
    assert!(close(bme.value(Channel::Humidity).unwrap(), 39.9));
    assert_eq!(delay.total() - before, Poll::DEFAULT.measuring_interval * 2);
    bme.free().free().done();
}

#[test]
fn failed_trigger_still_reads() {
    let mut expectations = init_transactions();
    expectations.extend([
        Transaction::write(ADDR, vec![0xF4, 0x25]).with_error(ErrorKind::Other),
        Transaction::write_read(ADDR, vec![0xF7], DATA_A.to_vec()),
    ]);
    let (mut bme, _, _) = driver(&expectations, Options::DEFAULT);
    bme.init().unwrap();
    assert!(close(bme.value(Channel::Temperature).unwrap(), 25.1));
    bme.free().free().done();
}

#[test]
fn failed_burst_keeps_values_stale() {
    let mut expectations = init_transactions();
    expectations.extend([
        Transaction::write(ADDR, vec![0xF4, 0x25]),
        Transaction::write_read(ADDR, vec![0xF3], vec![0x00]),
        Transaction::write_read(ADDR, vec![0xF7], vec![0; 8]).with_error(ErrorKind::Other),
    ]);
    expectations.extend(fetch_transactions(DATA_A));
    let (mut bme, _, _) = driver(&expectations, Options::DEFAULT);
    bme.init().unwrap();
    assert_eq!(bme.sample(), Err(Error::Bus(ErrorKind::Other)));
    assert!(bme.cached().pressure.is_nan());
    assert!(bme.is_active());
    assert!(close(bme.sample().unwrap().pressure, 1006.53));
    bme.free().free().done();
}

#[test]
fn sea_level_correction_grows_with_elevation() {
    let mut expectations = init_transactions();
    expectations.extend(fetch_transactions(DATA_A));
    expectations.extend(fetch_transactions(DATA_A));
    expectations.extend(fetch_transactions(DATA_A));
    let (mut bme, _, _) = driver(&expectations, Options::DEFAULT.set_elevation(500.0));
    bme.init().unwrap();
    assert_eq!(bme.elevation(), 500.0);

    let at_500 = bme.value(Channel::Pressure).unwrap();
    assert!(close(at_500, 1065.55));

    bme.set_elevation(1500.0);
    let at_1500 = bme.value(Channel::Pressure).unwrap();
    assert!(close(at_1500, 1191.98));

    bme.set_elevation(-3.0);
    assert_eq!(bme.elevation(), 0.0);
    let station = bme.value(Channel::Pressure).unwrap();
    assert!(close(station, 1006.53));

    assert!(station < at_500 && at_500 < at_1500);
    bme.free().free().done();
}

#[test]
fn reset_discards_values() {
    let mut expectations = init_transactions();
    expectations.extend(fetch_transactions(DATA_A));
    expectations.extend(init_transactions());
    expectations.extend(fetch_transactions(DATA_B));
    let (mut bme, _, _) = driver(&expectations, Options::DEFAULT);
    bme.init().unwrap();
    assert!(close(bme.value(Channel::Temperature).unwrap(), 25.1));

    assert_eq!(bme.reset(), Ok(()));
    assert!(bme.is_active());
    let sample = bme.cached();
    assert!(sample.pressure.is_nan());
    assert!(sample.temperature.is_nan());
    assert!(sample.humidity.is_nan());

    // the cache is stale although the refresh interval has not elapsed
    assert!(close(bme.value(Channel::Temperature).unwrap(), 27.7));
    bme.free().free().done();
}

#[test]
fn failed_reset_leaves_driver_inactive() {
    let mut expectations = init_transactions();
    expectations.extend(fetch_transactions(DATA_A));
    for _ in 0..3 {
        expectations.push(
            Transaction::write_read(ADDR, vec![0xD0], vec![0x00]).with_error(ErrorKind::Other),
        );
    }
    let (mut bme, _, _) = driver(&expectations, Options::DEFAULT);
    bme.init().unwrap();
    bme.sample().unwrap();

    assert_eq!(bme.reset(), Err(Error::Bus(ErrorKind::Other)));
    assert_eq!(bme.state(), State::Failed);
    assert!(bme.cached().temperature.is_nan());
    assert_eq!(bme.value_at(1), Err(Error::NotActive));
    bme.free().free().done();
}
