//! Live channel slots, keyed by host handle.
//!
//! The registry is append-only: a slot is created the first time a channel
//! string resolves and stays until the driver is dropped. Lookups go through
//! a [`RwLock`] so enumeration and dispatch never wait on each other; the
//! write side is only taken to insert a freshly materialized slot.
//!
//! Resolution itself must be serialized by the caller. [`crate::Driver`]
//! does this by holding its host lock (passed in as `&mut H`) for the whole
//! call, so two threads resolving the same normalized string can never both
//! allocate a parameter.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::channel::{Channel, ChannelKey, ChannelParser, Materialize, Slot};
use crate::error::{AutoparamError, AutoparamResult};
use crate::handler::HandlerTables;
use crate::host::{Handle, HostFramework};

/// Outcome of [`ChannelRegistry::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Handle of the channel.
    pub handle: Handle,
    /// False when the channel already existed.
    pub created: bool,
}

struct SlotMap<S> {
    by_handle: BTreeMap<Handle, Arc<S>>,
    by_key: HashMap<ChannelKey, Handle>,
}

/// Owner of every live slot of one driver.
pub struct ChannelRegistry<S: Slot> {
    parser: Box<dyn ChannelParser>,
    materializer: Box<dyn Materialize<S>>,
    slots: RwLock<SlotMap<S>>,
}

impl<S: Slot> ChannelRegistry<S> {
    /// Empty registry using `parser` and `materializer`.
    pub fn new(
        parser: impl ChannelParser + 'static,
        materializer: impl Materialize<S> + 'static,
    ) -> Self {
        Self::from_parts(Box::new(parser), Box::new(materializer))
    }

    pub(crate) fn from_parts(
        parser: Box<dyn ChannelParser>,
        materializer: Box<dyn Materialize<S>>,
    ) -> Self {
        Self {
            parser,
            materializer,
            slots: RwLock::new(SlotMap {
                by_handle: BTreeMap::new(),
                by_key: HashMap::new(),
            }),
        }
    }

    /// Map a raw channel string to a handle, creating the slot on first use.
    ///
    /// The declared type comes from whichever handler table the function
    /// name is registered in. If the materializer declines, the freshly
    /// created host parameter is discarded again.
    pub fn resolve<H: HostFramework>(
        &self,
        raw: &str,
        handlers: &HandlerTables<S>,
        host: &mut H,
    ) -> AutoparamResult<Resolved> {
        let key = self.parser.parse(raw).map_err(|err| {
            warn!(raw, error = %err, "Malformed channel identifier");
            AutoparamError::from(err)
        })?;
        if let Some(&handle) = self.slots.read().by_key.get(&key) {
            return Ok(Resolved {
                handle,
                created: false,
            });
        }

        let data_type = handlers.data_type_of(key.function()).ok_or_else(|| {
            error!(raw, function = key.function(), "No handler registered for function");
            AutoparamError::UnregisteredFunction {
                function: key.function().to_string(),
            }
        })?;

        let normalized = key.normalized();
        let handle = host.create_param(&normalized, data_type)?;
        let base = Channel::new(handle, data_type, key.clone());
        let Some(slot) = self.materializer.materialize(base) else {
            error!(channel = %normalized, %handle, "Driver declined to create a slot, discarding parameter");
            host.discard_param(handle);
            return Err(AutoparamError::MaterializeFailed {
                channel: normalized,
            });
        };

        debug!(channel = %normalized, %handle, %data_type, "Created channel");
        let mut slots = self.slots.write();
        slots.by_key.insert(key, handle);
        slots.by_handle.insert(handle, Arc::new(slot));
        Ok(Resolved {
            handle,
            created: true,
        })
    }

    /// Slot of `handle`.
    pub fn lookup(&self, handle: Handle) -> AutoparamResult<Arc<S>> {
        self.slots
            .read()
            .by_handle
            .get(&handle)
            .cloned()
            .ok_or_else(|| {
                warn!(%handle, "No channel exists for handle");
                AutoparamError::HandleNotFound(handle)
            })
    }

    /// Handle of an already resolved channel.
    pub fn find(&self, key: &ChannelKey) -> Option<Handle> {
        self.slots.read().by_key.get(key).copied()
    }

    /// Snapshot of every slot, in handle order.
    pub fn all_slots(&self) -> Vec<Arc<S>> {
        self.slots.read().by_handle.values().cloned().collect()
    }

    /// Slots for `handles`, skipping unknown handles and repeats. The first
    /// occurrence decides the order.
    pub fn slots_for(&self, handles: impl IntoIterator<Item = Handle>) -> Vec<Arc<S>> {
        let slots = self.slots.read();
        let mut seen = HashSet::new();
        handles
            .into_iter()
            .filter(|handle| seen.insert(*handle))
            .filter_map(|handle| slots.by_handle.get(&handle).cloned())
            .collect()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.read().by_handle.len()
    }

    /// True when no channel has been resolved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Slot> fmt::Debug for ChannelRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("ChannelRegistry")
            .field(
                "channels",
                &slots.by_key.keys().map(ChannelKey::normalized).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{DefaultParser, PlainChannels};
    use crate::error::ParseError;
    use crate::handler::Handlers;
    use crate::kind::{Float64, Int32};
    use crate::testing::RecordingHost;
    use crate::types::DataType;
    use tracing_test::traced_test;

    fn tables() -> HandlerTables<Channel> {
        let mut tables = HandlerTables::new();
        tables
            .register("FOO", Handlers::<Channel, Int32>::new())
            .unwrap();
        tables
            .register("VOLTS", Handlers::<Channel, Float64>::new())
            .unwrap();
        tables
    }

    #[test]
    fn test_resolve_is_idempotent_under_normalization() {
        let registry = ChannelRegistry::new(DefaultParser, PlainChannels);
        let tables = tables();
        let mut host = RecordingHost::default();

        let first = registry.resolve("FOO  1   2", &tables, &mut host).unwrap();
        let second = registry.resolve("FOO 1 2", &tables, &mut host).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.handle, second.handle);
        assert_eq!(host.created, vec![("FOO 1 2".to_string(), DataType::Int32)]);

        let slot = registry.lookup(first.handle).unwrap();
        assert_eq!(slot.data_type(), DataType::Int32);
        assert_eq!(slot.arguments(), ["1", "2"]);
        assert_eq!(registry.find(&"FOO 1 2".parse().unwrap()), Some(first.handle));
    }

    #[test]
    fn test_declared_type_comes_from_registration() {
        let registry = ChannelRegistry::new(DefaultParser, PlainChannels);
        let mut host = RecordingHost::default();
        let resolved = registry.resolve("VOLTS ch0", &tables(), &mut host).unwrap();
        assert_eq!(
            registry.lookup(resolved.handle).unwrap().data_type(),
            DataType::Float64
        );
    }

    #[test]
    #[traced_test]
    fn test_parse_error_creates_nothing() {
        let registry = ChannelRegistry::new(DefaultParser, PlainChannels);
        let mut host = RecordingHost::default();
        let err = registry
            .resolve("FOO {\"x\": 1}", &tables(), &mut host)
            .unwrap_err();
        assert!(matches!(err, AutoparamError::Parse(_)));
        assert!(registry.is_empty());
        assert!(host.created.is_empty());
        assert!(logs_contain("Malformed channel identifier"));
    }

    #[test]
    fn test_unregistered_function() {
        let registry = ChannelRegistry::new(DefaultParser, PlainChannels);
        let mut host = RecordingHost::default();
        let err = registry.resolve("BAR 1", &tables(), &mut host).unwrap_err();
        assert!(matches!(
            err,
            AutoparamError::UnregisteredFunction { ref function } if function == "BAR"
        ));
        assert!(host.created.is_empty());
    }

    #[test]
    fn test_declined_materialization_discards_parameter() {
        let registry = ChannelRegistry::new(DefaultParser, |base: Channel| {
            (!base.arguments().is_empty()).then_some(base)
        });
        let mut host = RecordingHost::default();

        let err = registry.resolve("FOO", &tables(), &mut host).unwrap_err();
        assert!(matches!(err, AutoparamError::MaterializeFailed { .. }));
        assert_eq!(host.discarded.len(), 1);
        assert!(registry.find(&"FOO".parse().unwrap()).is_none());

        registry.resolve("FOO 1", &tables(), &mut host).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_custom_parser() {
        let parser = |raw: &str| {
            raw.split_once(':')
                .map(|(function, arg)| ChannelKey::new(function, vec![arg.to_string()]))
                .ok_or_else(|| ParseError::Invalid {
                    raw: raw.to_string(),
                    reason: "expected FUNCTION:ARG".into(),
                })
        };
        let registry = ChannelRegistry::new(parser, PlainChannels);
        let mut host = RecordingHost::default();
        let resolved = registry.resolve("FOO:7", &tables(), &mut host).unwrap();
        let key = ChannelKey::new("FOO", vec!["7".to_string()]);
        assert_eq!(registry.find(&key), Some(resolved.handle));
        assert!(registry.resolve("FOO 7", &tables(), &mut host).is_err());
    }

    #[test]
    fn test_keys_with_equal_normalized_form_stay_distinct() {
        let parser = |raw: &str| {
            let mut parts = raw.split('|');
            let function = parts.next().unwrap_or_default();
            Ok::<_, ParseError>(ChannelKey::new(function, parts.map(str::to_string).collect()))
        };
        let registry = ChannelRegistry::new(parser, PlainChannels);
        let tables = tables();
        let mut host = RecordingHost::default();

        let joined = registry.resolve("FOO|1 2", &tables, &mut host).unwrap();
        let split = registry.resolve("FOO|1|2", &tables, &mut host).unwrap();
        assert!(split.created);
        assert_ne!(joined.handle, split.handle);
        let again = registry.resolve("FOO|1 2", &tables, &mut host).unwrap();
        assert_eq!(again.handle, joined.handle);
        assert!(!again.created);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_slots_for_deduplicates() {
        let registry = ChannelRegistry::new(DefaultParser, PlainChannels);
        let tables = tables();
        let mut host = RecordingHost::default();
        let a = registry.resolve("FOO a", &tables, &mut host).unwrap().handle;
        let b = registry.resolve("FOO b", &tables, &mut host).unwrap().handle;

        let slots = registry.slots_for([b, a, b, Handle(999), a]);
        let handles: Vec<_> = slots.iter().map(|s| s.handle()).collect();
        assert_eq!(handles, vec![b, a]);
        assert_eq!(registry.all_slots().len(), 2);
    }

    #[test]
    fn test_lookup_unknown_handle() {
        let registry = ChannelRegistry::<Channel>::new(DefaultParser, PlainChannels);
        assert!(matches!(
            registry.lookup(Handle(3)),
            Err(AutoparamError::HandleNotFound(Handle(3)))
        ));
    }
}
