//! In-memory host framework.
//!
//! [`MockHost`] keeps a parameter table, a list of interrupt subscriptions
//! and a log of every value delivered to a subscriber, which is what tests
//! assert against. Faults can be injected per primitive.

use std::collections::{BTreeMap, HashSet};

use autoparam_core::{
    Alarm, DataType, DriverOptions, Handle, HostError, HostFramework, InterruptId, ParamValue,
    Status,
};
use tracing::{debug, info, trace};

// =============================================================================
// Stored values
// =============================================================================

/// Owned copy of a parameter value.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub enum StoredValue {
    /// Never written.
    #[default]
    Undefined,
    Int32(i32),
    Int64(i64),
    UInt32Digital(u32),
    Float64(f64),
    Octet(String),
    Int8Array(Vec<i8>),
    Int16Array(Vec<i16>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float32Array(Vec<f32>),
    Float64Array(Vec<f64>),
}

impl From<ParamValue<'_>> for StoredValue {
    fn from(value: ParamValue<'_>) -> Self {
        match value {
            ParamValue::Int32(v) => StoredValue::Int32(v),
            ParamValue::Int64(v) => StoredValue::Int64(v),
            ParamValue::UInt32Digital { value, mask } => StoredValue::UInt32Digital(value & mask),
            ParamValue::Float64(v) => StoredValue::Float64(v),
            ParamValue::Octet(v) => StoredValue::Octet(v.to_string()),
            ParamValue::Int8Array(v) => StoredValue::Int8Array(v.to_vec()),
            ParamValue::Int16Array(v) => StoredValue::Int16Array(v.to_vec()),
            ParamValue::Int32Array(v) => StoredValue::Int32Array(v.to_vec()),
            ParamValue::Int64Array(v) => StoredValue::Int64Array(v.to_vec()),
            ParamValue::Float32Array(v) => StoredValue::Float32Array(v.to_vec()),
            ParamValue::Float64Array(v) => StoredValue::Float64Array(v.to_vec()),
        }
    }
}

/// One parameter of the mock host.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct MockParam {
    /// Normalized channel name.
    pub name: String,
    pub data_type: DataType,
    pub value: StoredValue,
    pub alarm: Alarm,
    /// Rolled back after creation; invisible to [`MockHost::find_param`].
    pub discarded: bool,
}

/// A value pushed to one interrupt subscriber.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct Delivery {
    pub interrupt: InterruptId,
    pub handle: Handle,
    pub value: StoredValue,
    pub alarm: Alarm,
}

// =============================================================================
// Fault injection
// =============================================================================

/// Host primitive that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum HostOperation {
    CreateParam,
    SetValue,
    RegisterInterrupt,
    CancelInterrupt,
}

#[derive(Debug, Default)]
struct Faults {
    fail_next: HashSet<HostOperation>,
    disconnected: bool,
}

impl Faults {
    fn check(&mut self, operation: HostOperation) -> Result<(), HostError> {
        if self.disconnected {
            return Err(HostError::new(Status::Disconnected, "port disconnected"));
        }
        if self.fail_next.remove(&operation) {
            return Err(HostError::new(
                Status::Error,
                format!("injected failure in {:?}", operation),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// MockHost
// =============================================================================

/// In-memory [`HostFramework`] implementation.
#[derive(Debug)]
pub struct MockHost {
    port: String,
    options: DriverOptions,
    params: Vec<MockParam>,
    interrupts: BTreeMap<InterruptId, (Handle, DataType)>,
    deliveries: Vec<Delivery>,
    faults: Faults,
    next_interrupt: u64,
}

impl MockHost {
    /// Empty port. `blocking` and `autoconnect` are only recorded.
    pub fn new(port: impl Into<String>, options: &DriverOptions) -> Self {
        let port = port.into();
        info!(
            port = %port,
            blocking = options.blocking,
            autoconnect = options.autoconnect,
            "Created mock host port"
        );
        Self {
            port,
            options: *options,
            params: Vec::new(),
            interrupts: BTreeMap::new(),
            deliveries: Vec::new(),
            faults: Faults::default(),
            next_interrupt: 1,
        }
    }

    /// Port name.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Options the port was created with.
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Live parameter of `handle`.
    pub fn param(&self, handle: Handle) -> Option<&MockParam> {
        self.params.get(handle.0).filter(|p| !p.discarded)
    }

    /// Stored value of a live parameter.
    pub fn value(&self, handle: Handle) -> Option<&StoredValue> {
        self.param(handle).map(|p| &p.value)
    }

    /// Stored alarm of a live parameter.
    pub fn alarm(&self, handle: Handle) -> Option<Alarm> {
        self.param(handle).map(|p| p.alarm)
    }

    /// Handle of the live parameter called `name`.
    pub fn find_param(&self, name: &str) -> Option<Handle> {
        self.params
            .iter()
            .position(|p| !p.discarded && p.name == name)
            .map(Handle)
    }

    /// Number of live parameters.
    pub fn param_count(&self) -> usize {
        self.params.iter().filter(|p| !p.discarded).count()
    }

    /// Number of parameters ever created, including discarded ones.
    pub fn created_count(&self) -> usize {
        self.params.len()
    }

    /// Every interrupt delivery so far, oldest first.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Deliveries recorded so far, clearing the log.
    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }

    /// Native subscriptions currently attached to `handle`.
    pub fn interrupt_count(&self, handle: Handle) -> usize {
        self.interrupts.values().filter(|(h, _)| *h == handle).count()
    }

    // -------------------------------------------------------------------------
    // Test controls
    // -------------------------------------------------------------------------

    /// Make the next call of `operation` fail.
    pub fn fail_next(&mut self, operation: HostOperation) {
        self.faults.fail_next.insert(operation);
    }

    /// While disconnected, every primitive that accepts fault injection
    /// fails with [`Status::Disconnected`].
    pub fn set_disconnected(&mut self, disconnected: bool) {
        self.faults.disconnected = disconnected;
    }

    /// Attach a subscription directly, bypassing the driver. Models a
    /// client that talks to the native interface behind the layer's back.
    pub fn attach_native_interrupt(&mut self, handle: Handle, data_type: DataType) -> InterruptId {
        let id = InterruptId(self.next_interrupt);
        self.next_interrupt += 1;
        self.interrupts.insert(id, (handle, data_type));
        id
    }

    fn live_param_mut(&mut self, handle: Handle) -> Result<&mut MockParam, HostError> {
        self.params
            .get_mut(handle.0)
            .filter(|p| !p.discarded)
            .ok_or_else(|| HostError::new(Status::Error, format!("no parameter {}", handle)))
    }

    fn deliver(&mut self, handle: Handle, value: StoredValue, alarm: Alarm) {
        let subscribers: Vec<InterruptId> = self
            .interrupts
            .iter()
            .filter(|(_, (h, _))| *h == handle)
            .map(|(id, _)| *id)
            .collect();
        trace!(port = %self.port, %handle, subscribers = subscribers.len(), "Delivering value");
        for interrupt in subscribers {
            self.deliveries.push(Delivery {
                interrupt,
                handle,
                value: value.clone(),
                alarm,
            });
        }
    }
}

impl HostFramework for MockHost {
    fn create_param(&mut self, name: &str, data_type: DataType) -> Result<Handle, HostError> {
        self.faults.check(HostOperation::CreateParam)?;
        if self.find_param(name).is_some() {
            return Err(HostError::new(
                Status::Error,
                format!("parameter '{}' already exists", name),
            ));
        }
        let handle = Handle(self.params.len());
        self.params.push(MockParam {
            name: name.to_string(),
            data_type,
            value: StoredValue::Undefined,
            alarm: Alarm::NONE,
            discarded: false,
        });
        debug!(port = %self.port, name, %handle, %data_type, "Created parameter");
        Ok(handle)
    }

    fn discard_param(&mut self, handle: Handle) {
        if let Some(param) = self.params.get_mut(handle.0) {
            param.discarded = true;
            debug!(port = %self.port, %handle, "Discarded parameter");
        }
    }

    fn set_param_value(&mut self, handle: Handle, value: ParamValue<'_>) -> Result<(), HostError> {
        self.faults.check(HostOperation::SetValue)?;
        let param = self.live_param_mut(handle)?;
        if param.data_type != value.data_type() {
            return Err(HostError::new(
                Status::Error,
                format!(
                    "parameter {} is {}, not {}",
                    handle,
                    param.data_type,
                    value.data_type()
                ),
            ));
        }
        param.value = match (value, &param.value) {
            (ParamValue::UInt32Digital { value, mask }, StoredValue::UInt32Digital(old)) => {
                StoredValue::UInt32Digital((old & !mask) | (value & mask))
            }
            (value, _) => StoredValue::from(value),
        };
        Ok(())
    }

    fn set_param_alarm(&mut self, handle: Handle, alarm: Alarm) -> Result<(), HostError> {
        self.live_param_mut(handle)?.alarm = alarm;
        Ok(())
    }

    fn call_param_callbacks(&mut self, handle: Handle) -> Result<(), HostError> {
        let param = self.live_param_mut(handle)?;
        let (value, alarm) = (param.value.clone(), param.alarm);
        self.deliver(handle, value, alarm);
        Ok(())
    }

    fn do_array_callbacks(
        &mut self,
        handle: Handle,
        value: ParamValue<'_>,
    ) -> Result<(), HostError> {
        let alarm = self.live_param_mut(handle)?.alarm;
        self.deliver(handle, StoredValue::from(value), alarm);
        Ok(())
    }

    fn register_interrupt(
        &mut self,
        handle: Handle,
        data_type: DataType,
    ) -> Result<InterruptId, HostError> {
        self.faults.check(HostOperation::RegisterInterrupt)?;
        self.live_param_mut(handle)?;
        Ok(self.attach_native_interrupt(handle, data_type))
    }

    fn cancel_interrupt(
        &mut self,
        id: InterruptId,
        data_type: DataType,
    ) -> Result<Handle, HostError> {
        self.faults.check(HostOperation::CancelInterrupt)?;
        match self.interrupts.get(&id) {
            Some(&(handle, registered)) if registered == data_type => {
                self.interrupts.remove(&id);
                Ok(handle)
            }
            Some(&(_, registered)) => Err(HostError::new(
                Status::Error,
                format!("interrupt {} belongs to the {} interface", id, registered),
            )),
            None => Err(HostError::new(
                Status::Error,
                format!("unknown interrupt {}", id),
            )),
        }
    }

    fn interrupt_handles(&self, data_type: DataType) -> Vec<Handle> {
        self.interrupts
            .values()
            .filter(|(_, ty)| *ty == data_type)
            .map(|(handle, _)| *handle)
            .collect()
    }
}
