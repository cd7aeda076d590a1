//! Minimal host framework for unit tests.

use std::collections::{BTreeMap, HashMap};

use crate::error::HostError;
use crate::host::{Handle, HostFramework, InterruptId};
use crate::status::{Alarm, Status};
use crate::types::{DataType, ParamValue};

/// Records every call; values are kept in their `Debug` form.
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    pub created: Vec<(String, DataType)>,
    pub discarded: Vec<Handle>,
    pub values: HashMap<Handle, String>,
    pub alarms: HashMap<Handle, Alarm>,
    pub notified: Vec<Handle>,
    pub array_deliveries: Vec<Handle>,
    pub interrupts: BTreeMap<InterruptId, (Handle, DataType)>,
    pub fail_register: bool,
    next_handle: usize,
    next_interrupt: u64,
}

impl HostFramework for RecordingHost {
    fn create_param(&mut self, name: &str, data_type: DataType) -> Result<Handle, HostError> {
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        self.created.push((name.to_string(), data_type));
        Ok(handle)
    }

    fn discard_param(&mut self, handle: Handle) {
        self.discarded.push(handle);
    }

    fn set_param_value(&mut self, handle: Handle, value: ParamValue<'_>) -> Result<(), HostError> {
        self.values.insert(handle, format!("{:?}", value));
        Ok(())
    }

    fn set_param_alarm(&mut self, handle: Handle, alarm: Alarm) -> Result<(), HostError> {
        self.alarms.insert(handle, alarm);
        Ok(())
    }

    fn call_param_callbacks(&mut self, handle: Handle) -> Result<(), HostError> {
        self.notified.push(handle);
        Ok(())
    }

    fn do_array_callbacks(
        &mut self,
        handle: Handle,
        _value: ParamValue<'_>,
    ) -> Result<(), HostError> {
        self.array_deliveries.push(handle);
        Ok(())
    }

    fn register_interrupt(
        &mut self,
        handle: Handle,
        data_type: DataType,
    ) -> Result<InterruptId, HostError> {
        if self.fail_register {
            return Err(HostError::new(Status::Error, "registration refused"));
        }
        let id = InterruptId(self.next_interrupt);
        self.next_interrupt += 1;
        self.interrupts.insert(id, (handle, data_type));
        Ok(id)
    }

    fn cancel_interrupt(
        &mut self,
        id: InterruptId,
        _data_type: DataType,
    ) -> Result<Handle, HostError> {
        self.interrupts
            .remove(&id)
            .map(|(handle, _)| handle)
            .ok_or_else(|| HostError::new(Status::Error, format!("unknown interrupt {}", id)))
    }

    fn interrupt_handles(&self, data_type: DataType) -> Vec<Handle> {
        self.interrupts
            .values()
            .filter(|(_, ty)| *ty == data_type)
            .map(|(handle, _)| *handle)
            .collect()
    }
}
