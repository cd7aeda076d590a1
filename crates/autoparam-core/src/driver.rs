//! The driver: registry, handler tables, subscriptions and host, tied
//! together behind one port name.
//!
//! # Building
//!
//! ```rust,ignore
//! let driver = DriverBuilder::new("SUMS", host, |base| Some(SumSlot::new(base)))
//!     .options(DriverOptions::default().blocking(true))
//!     .with_handlers::<Int32>("SUM", |h| h.read(read_sum).write(add_to_sum))
//!     .init_hook(|driver| {
//!         for slot in driver.interrupt_subscribed_slots() {
//!             slot.start_polling();
//!         }
//!     })
//!     .build();
//! ```
//!
//! Handler tables are frozen by [`DriverBuilder::build`]; the host can only
//! start resolving channels once it holds the finished [`Driver`].
//!
//! # Locking
//!
//! | Lock                          | Guards                      | Taken by                           |
//! |-------------------------------|-----------------------------|------------------------------------|
//! | host `Mutex<H>`               | host primitives, resolution | resolve, value updates, native sub |
//! | registry `RwLock`             | slot map                    | lookups (read), new slots (write)  |
//! | subscription `ReentrantMutex` | interrupt transitions       | subscribe / unsubscribe            |
//! | subscription `Mutex`          | subscriber counts           | count reads and updates            |
//!
//! User read/write handlers never run with the host lock held, so they may
//! call [`Driver::set_param`] themselves. Interrupt callbacks run with only
//! the transition guard held and may call back into the driver.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::channel::{Channel, ChannelParser, DefaultParser, Materialize, PlainChannels, Slot};
use crate::error::{AutoparamError, AutoparamResult};
use crate::handler::{HandlerTables, Handlers};
use crate::host::{Handle, HostFramework, InterruptId};
use crate::init_hook::{AfterInit, InitHooks};
use crate::kind::HandlerKind;
use crate::options::DriverOptions;
use crate::registry::ChannelRegistry;
use crate::status::Alarm;
use crate::subscription::SubscriptionTracker;
use crate::types::{DataType, ParamValue};

type InitHookFn<S, H> = Box<dyn Fn(&Driver<S, H>) + Send + Sync>;

// =============================================================================
// Builder
// =============================================================================

/// Collects everything a [`Driver`] needs before the host starts using it.
pub struct DriverBuilder<S: Slot, H: HostFramework> {
    port: String,
    host: H,
    options: DriverOptions,
    parser: Box<dyn ChannelParser>,
    materializer: Box<dyn Materialize<S>>,
    handlers: HandlerTables<S>,
    init_hooks: Vec<InitHookFn<S, H>>,
}

impl<S: Slot, H: HostFramework> fmt::Debug for DriverBuilder<S, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBuilder")
            .field("port", &self.port)
            .field("options", &self.options)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl<S: Slot, H: HostFramework> DriverBuilder<S, H> {
    /// Start a driver for `port` whose slots are built by `materializer`.
    pub fn new(
        port: impl Into<String>,
        host: H,
        materializer: impl Materialize<S> + 'static,
    ) -> Self {
        Self {
            port: port.into(),
            host,
            options: DriverOptions::default(),
            parser: Box::new(DefaultParser),
            materializer: Box::new(materializer),
            handlers: HandlerTables::new(),
            init_hooks: Vec::new(),
        }
    }

    /// Replace the default [`DriverOptions`].
    pub fn options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the default whitespace channel syntax.
    pub fn parser(mut self, parser: impl ChannelParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Register handlers for `function` under kind `K`.
    ///
    /// `configure` receives an empty [`Handlers`] set for the kind and
    /// returns the configured one:
    ///
    /// ```rust,ignore
    /// builder.register::<Float64>("VOLTS", |h| h.write(set_volts))?;
    /// ```
    pub fn register<K: HandlerKind<S>>(
        &mut self,
        function: &str,
        configure: impl FnOnce(Handlers<S, K>) -> Handlers<S, K>,
    ) -> AutoparamResult<&mut Self> {
        self.handlers.register(function, configure(Handlers::new()))?;
        Ok(self)
    }

    /// Chaining form of [`DriverBuilder::register`]. A conflicting
    /// registration is logged and ignored.
    pub fn with_handlers<K: HandlerKind<S>>(
        mut self,
        function: &str,
        configure: impl FnOnce(Handlers<S, K>) -> Handlers<S, K>,
    ) -> Self {
        if let Err(err) = self.register::<K>(function, configure).map(|_| ()) {
            warn!(port = %self.port, error = %err, "Ignoring handler registration");
        }
        self
    }

    /// Run `hook` when the driver's after-init hook fires.
    pub fn init_hook(mut self, hook: impl Fn(&Driver<S, H>) + Send + Sync + 'static) -> Self {
        self.init_hooks.push(Box::new(hook));
        self
    }

    /// Freeze the handler tables and create the driver.
    pub fn build(self) -> Arc<Driver<S, H>> {
        info!(
            port = %self.port,
            functions = self.handlers.len(),
            auto_interrupts = self.options.auto_interrupts,
            "Built autoparam driver"
        );
        Arc::new(Driver {
            port: self.port,
            options: self.options,
            registry: ChannelRegistry::from_parts(self.parser, self.materializer),
            handlers: self.handlers,
            subscriptions: SubscriptionTracker::new(),
            host: Mutex::new(self.host),
            init_hooks: self.init_hooks,
        })
    }
}

impl<H: HostFramework> DriverBuilder<Channel, H> {
    /// Start a driver that needs no per-channel state beyond [`Channel`].
    pub fn plain(port: impl Into<String>, host: H) -> Self {
        Self::new(port, host, PlainChannels)
    }
}

// =============================================================================
// Driver
// =============================================================================

/// A port driver built on dynamic channels.
///
/// Read and write entry points live in [`crate::dispatch`].
pub struct Driver<S: Slot, H: HostFramework> {
    pub(crate) port: String,
    pub(crate) options: DriverOptions,
    pub(crate) registry: ChannelRegistry<S>,
    pub(crate) handlers: HandlerTables<S>,
    pub(crate) subscriptions: SubscriptionTracker,
    pub(crate) host: Mutex<H>,
    init_hooks: Vec<InitHookFn<S, H>>,
}

impl<S: Slot, H: HostFramework> Driver<S, H> {
    /// Name of the port this driver serves.
    pub fn port_name(&self) -> &str {
        &self.port
    }

    /// Options the driver was built with.
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// The frozen handler tables.
    pub fn handlers(&self) -> &HandlerTables<S> {
        &self.handlers
    }

    /// Exclusive access to the host framework. Hold it only briefly; every
    /// dispatch path needs it.
    pub fn host(&self) -> MutexGuard<'_, H> {
        self.host.lock()
    }

    /// Map a channel string to its handle, creating the channel on first use.
    pub fn resolve(&self, raw: &str) -> AutoparamResult<Handle> {
        let mut host = self.host.lock();
        let resolved = self.registry.resolve(raw, &self.handlers, &mut *host)?;
        if resolved.created {
            info!(port = %self.port, raw, handle = %resolved.handle, "Resolved new channel");
        }
        Ok(resolved.handle)
    }

    /// Slot of a resolved channel.
    pub fn lookup(&self, handle: Handle) -> AutoparamResult<Arc<S>> {
        self.registry.lookup(handle)
    }

    /// Every channel resolved so far, in handle order.
    pub fn all_slots(&self) -> Vec<Arc<S>> {
        self.registry.all_slots()
    }

    /// Channels with at least one interrupt subscriber on any interface,
    /// each listed once.
    pub fn interrupt_subscribed_slots(&self) -> Vec<Arc<S>> {
        let handles: Vec<Handle> = {
            let host = self.host.lock();
            DataType::ALL
                .iter()
                .flat_map(|data_type| host.interrupt_handles(*data_type))
                .collect()
        };
        self.registry.slots_for(handles)
    }

    /// Interrupt subscribers currently counted for `handle`.
    pub fn subscriber_count(&self, handle: Handle) -> usize {
        self.subscriptions.count(handle)
    }

    pub(crate) fn typed_slot(&self, handle: Handle, requested: DataType) -> AutoparamResult<Arc<S>> {
        let slot = self.registry.lookup(handle)?;
        let declared = slot.channel().data_type();
        if declared != requested {
            warn!(port = %self.port, %handle, %declared, %requested, "Channel accessed through the wrong interface");
            return Err(AutoparamError::TypeMismatch {
                handle,
                declared,
                requested,
            });
        }
        Ok(slot)
    }

    // -------------------------------------------------------------------------
    // Pushing values from device code
    // -------------------------------------------------------------------------

    /// Store a value and alarm for a channel outside of a read.
    ///
    /// Scalar and octet values are only stored; call
    /// [`Driver::call_param_callbacks`] to notify subscribers, which allows
    /// several values to be updated first. Array values are not stored by
    /// the host and are delivered to subscribers immediately.
    pub fn set_param(&self, handle: Handle, value: ParamValue<'_>, alarm: Alarm) -> AutoparamResult<()> {
        let data_type = value.data_type();
        self.typed_slot(handle, data_type)?;

        let mut host = self.host.lock();
        host.set_param_alarm(handle, alarm)?;
        if data_type.is_array() {
            host.do_array_callbacks(handle, value)?;
        } else {
            host.set_param_value(handle, value)?;
        }
        Ok(())
    }

    /// Notify subscribers of the stored value of a scalar or octet channel.
    pub fn call_param_callbacks(&self, handle: Handle) -> AutoparamResult<()> {
        self.registry.lookup(handle)?;
        self.host.lock().call_param_callbacks(handle)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Interrupt subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe to `handle` through the interface of kind `K`.
    pub fn subscribe<K: HandlerKind<S>>(&self, handle: Handle) -> AutoparamResult<InterruptId> {
        self.subscribe_dyn(handle, K::DATA_TYPE)
    }

    /// Cancel subscription `id` of the interface of kind `K`.
    pub fn unsubscribe<K: HandlerKind<S>>(&self, id: InterruptId) -> AutoparamResult<Handle> {
        self.unsubscribe_dyn(id, K::DATA_TYPE)
    }

    /// [`Driver::subscribe`] with the interface chosen at runtime.
    pub fn subscribe_dyn(&self, handle: Handle, data_type: DataType) -> AutoparamResult<InterruptId> {
        let slot = self.typed_slot(handle, data_type)?;
        let callback = self
            .handlers
            .interrupt_callback(data_type, slot.channel().function());
        self.subscriptions.subscribe(&*slot, callback.as_ref(), || {
            self.host.lock().register_interrupt(handle, data_type)
        })
    }

    /// [`Driver::unsubscribe`] with the interface chosen at runtime.
    pub fn unsubscribe_dyn(&self, id: InterruptId, data_type: DataType) -> AutoparamResult<Handle> {
        self.subscriptions.unsubscribe(
            || self.host.lock().cancel_interrupt(id, data_type),
            |handle| {
                let slot = self.registry.lookup(handle)?;
                let callback = self
                    .handlers
                    .interrupt_callback(data_type, slot.channel().function());
                Ok((slot, callback))
            },
        )
    }

    /// Queue this driver's init hooks on the host's hook list.
    pub fn register_after_init(self: &Arc<Self>, hooks: &InitHooks) {
        hooks.register(Arc::clone(self) as Arc<dyn AfterInit>);
    }
}

impl<S: Slot, H: HostFramework> AfterInit for Driver<S, H> {
    fn after_init(&self) {
        if self.init_hooks.is_empty() {
            return;
        }
        info!(port = %self.port, hooks = self.init_hooks.len(), "Running driver init hooks");
        for hook in &self.init_hooks {
            hook(self);
        }
    }
}

impl<S: Slot, H: HostFramework> fmt::Debug for Driver<S, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("port", &self.port)
            .field("options", &self.options)
            .field("handlers", &self.handlers)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<S: Slot, H: HostFramework> Drop for Driver<S, H> {
    fn drop(&mut self) {
        let live = self.registry.len();
        if live > 0 {
            info!(port = %self.port, channels = live, "Releasing channels");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{Float32Array, Int32};
    use crate::status::{AlarmSeverity, AlarmStatus, Status};
    use crate::testing::RecordingHost;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn driver() -> Arc<Driver<Channel, RecordingHost>> {
        DriverBuilder::plain("TEST", RecordingHost::default())
            .with_handlers::<Int32>("LONG", |h| h)
            .with_handlers::<Float32Array>("WAVE", |h| h)
            .build()
    }

    #[test]
    fn test_builder_rejects_conflicting_kind() {
        let mut builder = DriverBuilder::plain("TEST", RecordingHost::default());
        builder.register::<Int32>("LONG", |h| h).unwrap();
        assert!(builder.register::<Float32Array>("LONG", |h| h).is_err());
        let driver = builder.build();
        assert_eq!(driver.handlers().data_type_of("LONG"), Some(DataType::Int32));
    }

    #[test]
    fn test_interrupt_slots_are_deduplicated() {
        let driver = driver();
        let long = driver.resolve("LONG").unwrap();
        let wave = driver.resolve("WAVE 0").unwrap();
        driver.resolve("LONG 2").unwrap();

        driver.subscribe::<Int32>(long).unwrap();
        driver.subscribe::<Int32>(long).unwrap();
        driver.subscribe::<Float32Array>(wave).unwrap();

        let handles: Vec<_> = driver
            .interrupt_subscribed_slots()
            .iter()
            .map(|slot| slot.handle())
            .collect();
        assert_eq!(handles, vec![long, wave]);
        assert_eq!(driver.all_slots().len(), 3);
    }

    #[test]
    fn test_subscribe_through_wrong_interface() {
        let driver = driver();
        let long = driver.resolve("LONG").unwrap();
        let err = driver.subscribe_dyn(long, DataType::Float64).unwrap_err();
        assert!(matches!(err, AutoparamError::TypeMismatch { .. }));
        assert_eq!(driver.subscriber_count(long), 0);
        assert!(driver.host().interrupts.is_empty());
    }

    #[test]
    fn test_refused_native_subscription_is_not_counted() {
        let driver = driver();
        let long = driver.resolve("LONG").unwrap();
        driver.host().fail_register = true;

        let err = driver.subscribe::<Int32>(long).unwrap_err();
        assert!(matches!(err, AutoparamError::Host(_)));
        assert_eq!(driver.subscriber_count(long), 0);
        assert!(driver.interrupt_subscribed_slots().is_empty());
    }

    #[test]
    fn test_set_param_checks_type_and_routes_arrays() {
        let driver = driver();
        let long = driver.resolve("LONG").unwrap();
        let wave = driver.resolve("WAVE").unwrap();
        let alarm = Alarm::new(AlarmStatus::HiHi, AlarmSeverity::Major);

        driver.set_param(long, ParamValue::Int32(5), alarm).unwrap();
        driver
            .set_param(wave, ParamValue::Float32Array(&[1.0, 2.0]), Alarm::NONE)
            .unwrap();
        assert!(driver
            .set_param(long, ParamValue::Float64(1.0), Alarm::NONE)
            .is_err());

        let host = driver.host();
        assert_eq!(host.values.get(&long).map(String::as_str), Some("Int32(5)"));
        assert_eq!(host.alarms.get(&long), Some(&alarm));
        assert!(host.notified.is_empty());
        assert_eq!(host.array_deliveries, vec![wave]);
    }

    #[test]
    fn test_call_param_callbacks_unknown_handle() {
        let driver = driver();
        let err = driver.call_param_callbacks(Handle(40)).unwrap_err();
        assert_eq!(err.status(), Status::Error);
    }

    #[test]
    fn test_init_hooks_see_subscribed_channels() {
        let seen = Arc::new(AtomicUsize::new(0));
        let ran = Arc::new(AtomicBool::new(false));
        let driver = {
            let seen = Arc::clone(&seen);
            let ran = Arc::clone(&ran);
            DriverBuilder::plain("TEST", RecordingHost::default())
                .with_handlers::<Int32>("LONG", |h| h)
                .init_hook(move |driver| {
                    seen.store(driver.interrupt_subscribed_slots().len(), Ordering::SeqCst);
                    ran.store(true, Ordering::SeqCst);
                })
                .build()
        };
        let handle = driver.resolve("LONG").unwrap();
        driver.subscribe::<Int32>(handle).unwrap();

        let hooks = InitHooks::new();
        driver.register_after_init(&hooks);
        assert!(!ran.load(Ordering::SeqCst));
        hooks.run();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
