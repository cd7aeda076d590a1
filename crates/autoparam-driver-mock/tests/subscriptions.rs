//! Interrupt subscriber counting and init hooks.
//!
//! Run with: cargo test -p autoparam-driver-mock --test subscriptions

use std::sync::{Arc, Weak};

use autoparam_core::kind::{Float32Array, Float64, Int32};
use autoparam_core::{
    AutoparamError, Channel, DataType, Driver, DriverBuilder, DriverOptions, InitHooks, ReadResult,
    Slot, Status,
};
use autoparam_driver_mock::{instrument_driver, sum_driver, HostOperation, MockHost};
use parking_lot::Mutex;

// =============================================================================
// Refcount transitions
// =============================================================================

#[test]
fn test_callback_fires_only_on_edges() {
    let (driver, device) = sum_driver("SUMS", DriverOptions::default());
    let sum = driver.resolve("SUM 1").unwrap();

    let a = driver.subscribe::<Int32>(sum).unwrap();
    let b = driver.subscribe::<Int32>(sum).unwrap();
    let c = driver.subscribe::<Int32>(sum).unwrap();
    assert_eq!(driver.subscriber_count(sum), 3);
    assert_eq!(device.events(), vec![(sum, true)]);

    assert_eq!(driver.unsubscribe::<Int32>(b).unwrap(), sum);
    assert_eq!(driver.unsubscribe::<Int32>(a).unwrap(), sum);
    assert_eq!(device.events(), vec![(sum, true)]);

    driver.unsubscribe::<Int32>(c).unwrap();
    assert_eq!(driver.subscriber_count(sum), 0);
    assert_eq!(device.events(), vec![(sum, true), (sum, false)]);

    driver.subscribe::<Int32>(sum).unwrap();
    assert_eq!(
        device.events(),
        vec![(sum, true), (sum, false), (sum, true)]
    );
}

#[test]
fn test_channels_are_counted_separately() {
    let (driver, device) = sum_driver("SUMS", DriverOptions::default());
    let one = driver.resolve("SUM 1").unwrap();
    let two = driver.resolve("SUM 2").unwrap();

    driver.subscribe::<Int32>(one).unwrap();
    driver.subscribe::<Int32>(two).unwrap();
    driver.subscribe::<Int32>(one).unwrap();

    assert_eq!(driver.subscriber_count(one), 2);
    assert_eq!(driver.subscriber_count(two), 1);
    assert_eq!(device.events(), vec![(one, true), (two, true)]);
    assert_eq!(driver.host().interrupt_count(one), 2);
}

#[test]
fn test_native_failure_changes_nothing() {
    let (driver, device) = sum_driver("SUMS", DriverOptions::default());
    let sum = driver.resolve("SUM 1").unwrap();

    driver.host().fail_next(HostOperation::RegisterInterrupt);
    let err = driver.subscribe::<Int32>(sum).unwrap_err();
    assert!(matches!(err, AutoparamError::Host(_)));
    assert_eq!(driver.subscriber_count(sum), 0);
    assert!(device.events().is_empty());

    let id = driver.subscribe::<Int32>(sum).unwrap();
    driver.host().fail_next(HostOperation::CancelInterrupt);
    assert!(driver.unsubscribe::<Int32>(id).is_err());
    assert_eq!(driver.subscriber_count(sum), 1);
    assert_eq!(device.events(), vec![(sum, true)]);
}

#[test]
fn test_disconnected_host_refuses_subscriptions() {
    let (driver, device) = sum_driver("SUMS", DriverOptions::default());
    let sum = driver.resolve("SUM 1").unwrap();

    driver.host().set_disconnected(true);
    let err = driver.subscribe::<Int32>(sum).unwrap_err();
    assert_eq!(err.status(), Status::Disconnected);
    assert!(device.events().is_empty());

    driver.host().set_disconnected(false);
    assert!(driver.subscribe::<Int32>(sum).is_ok());
}

#[test]
fn test_underflow_is_clamped_and_reported() {
    let (driver, device) = sum_driver("SUMS", DriverOptions::default());
    let sum = driver.resolve("SUM 1").unwrap();

    let stray = driver
        .host()
        .attach_native_interrupt(sum, DataType::Int32);
    let err = driver.unsubscribe::<Int32>(stray).unwrap_err();
    assert!(matches!(err, AutoparamError::RefcountUnderflow(h) if h == sum));
    assert_eq!(driver.subscriber_count(sum), 0);
    assert_eq!(driver.host().interrupt_count(sum), 0);
    assert!(device.events().is_empty());

    driver.subscribe::<Int32>(sum).unwrap();
    assert_eq!(device.events(), vec![(sum, true)]);
}

#[test]
fn test_wrong_interface_subscription() {
    let (driver, _) = sum_driver("SUMS", DriverOptions::default());
    let sum = driver.resolve("SUM 1").unwrap();

    let err = driver.subscribe::<Float64>(sum).unwrap_err();
    assert!(matches!(err, AutoparamError::TypeMismatch { .. }));
    assert_eq!(driver.host().interrupt_count(sum), 0);

    let id = driver.subscribe::<Int32>(sum).unwrap();
    assert!(driver.unsubscribe::<Float64>(id).is_err());
    assert_eq!(driver.subscriber_count(sum), 1);
}

#[test]
fn test_callback_can_call_back_into_driver() {
    type PlainDriver = Driver<Channel, MockHost>;

    let owner: Arc<Mutex<Weak<PlainDriver>>> = Arc::new(Mutex::new(Weak::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let host = MockHost::new("REENTER", &DriverOptions::default());
    let driver = {
        let owner = Arc::clone(&owner);
        let seen = Arc::clone(&seen);
        DriverBuilder::plain("REENTER", host)
            .with_handlers::<Int32>("LIVE", move |h| {
                h.read(|_| ReadResult::ok(0))
                    .on_interrupt(move |slot: &Channel, active: bool| {
                        let Some(driver) = owner.lock().upgrade() else {
                            return Status::Error;
                        };
                        let count = driver.subscriber_count(slot.handle());
                        let listed = driver.interrupt_subscribed_slots().len();
                        seen.lock().push((active, count, listed));
                        Status::Success
                    })
            })
            .build()
    };
    *owner.lock() = Arc::downgrade(&driver);

    let live = driver.resolve("LIVE").unwrap();
    let id = driver.subscribe::<Int32>(live).unwrap();
    driver.unsubscribe::<Int32>(id).unwrap();

    assert_eq!(*seen.lock(), vec![(true, 1, 1), (false, 0, 0)]);
}

#[test]
fn test_failing_callback_keeps_count() {
    let host = MockHost::new("FAIL", &DriverOptions::default());
    let driver = DriverBuilder::plain("FAIL", host)
        .with_handlers::<Int32>("FLAKY", |h| {
            h.read(|_| ReadResult::ok(0))
                .on_interrupt(|_, _| Status::Timeout)
        })
        .build();
    let flaky = driver.resolve("FLAKY").unwrap();

    let err = driver.subscribe::<Int32>(flaky).unwrap_err();
    assert!(matches!(
        err,
        AutoparamError::Callback { activating: true, status: Status::Timeout, .. }
    ));
    assert_eq!(err.status(), Status::Timeout);
    assert_eq!(driver.subscriber_count(flaky), 1);
    assert_eq!(driver.host().interrupt_count(flaky), 1);

    let id = driver.subscribe::<Int32>(flaky).unwrap();
    assert_eq!(driver.subscriber_count(flaky), 2);
    driver.unsubscribe::<Int32>(id).unwrap();
}

#[test]
fn test_channels_without_callback_are_still_counted() {
    let (driver, _) = instrument_driver("INSTR", DriverOptions::default());
    let long = driver.resolve("LONG").unwrap();
    let id = driver.subscribe::<Int32>(long).unwrap();
    assert_eq!(driver.subscriber_count(long), 1);
    driver.unsubscribe::<Int32>(id).unwrap();
    assert_eq!(driver.subscriber_count(long), 0);
}

#[test]
fn test_wave_streams_while_subscribed() {
    let (driver, state) = instrument_driver("INSTR", DriverOptions::default());
    let wave = driver.resolve("WAVE 4").unwrap();

    let a = driver.subscribe::<Float32Array>(wave).unwrap();
    let b = driver
        .subscribe_dyn(wave, DataType::Float32Array)
        .unwrap();
    assert!(state.streaming());

    driver.unsubscribe::<Float32Array>(a).unwrap();
    assert!(state.streaming());
    driver
        .unsubscribe_dyn(b, DataType::Float32Array)
        .unwrap();
    assert!(!state.streaming());
}

// =============================================================================
// Init hooks
// =============================================================================

#[test]
fn test_interrupt_subscribed_slots_deduplicates() {
    let (driver, _) = sum_driver("SUMS", DriverOptions::default());
    let one = driver.resolve("SUM 1").unwrap();
    let _idle = driver.resolve("SUM 2").unwrap();
    let three = driver.resolve("SUM 3").unwrap();

    driver.subscribe::<Int32>(three).unwrap();
    driver.subscribe::<Int32>(one).unwrap();
    driver.subscribe::<Int32>(three).unwrap();

    let mut handles: Vec<_> = driver
        .interrupt_subscribed_slots()
        .iter()
        .map(|slot| slot.channel().handle())
        .collect();
    handles.sort();
    assert_eq!(handles, vec![one, three]);
}

#[test]
fn test_init_hook_sees_subscriptions_made_before_init() {
    let (driver, device) = sum_driver("SUMS", DriverOptions::default());
    let hooks = InitHooks::new();
    driver.register_after_init(&hooks);

    let one = driver.resolve("SUM 1").unwrap();
    driver.resolve("SUM 2").unwrap();
    driver.subscribe::<Int32>(one).unwrap();
    driver.subscribe::<Int32>(one).unwrap();
    assert!(device.polling().is_empty());

    hooks.run();
    assert_eq!(device.polling(), vec![one]);

    hooks.run();
    assert_eq!(device.polling(), vec![one]);
}

#[test]
fn test_driver_registered_after_init_runs_immediately() {
    let hooks = InitHooks::new();
    hooks.run();

    let (driver, device) = sum_driver("LATE", DriverOptions::default());
    let sum = driver.resolve("SUM 1").unwrap();
    driver.subscribe::<Int32>(sum).unwrap();

    driver.register_after_init(&hooks);
    assert_eq!(device.polling(), vec![sum]);
}
