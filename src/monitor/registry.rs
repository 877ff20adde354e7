use std::{
    net::{AddrParseError, IpAddr},
    sync::{Arc, PoisonError, RwLock},
};

use dashmap::DashMap;
use log::info;
use snafu::{ensure, ResultExt, Snafu};

use crate::device::DeviceProbe;

use super::{
    events::{EventBus, MonitorEvent},
    printer::{Printer, PrinterId, PrinterSnapshot},
};

/// One row of [`PrinterRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterView {
    pub id: PrinterId,
    pub name: String,
    pub snapshot: Arc<PrinterSnapshot>,
}

/// The monitored printers, in the order they were added.
///
/// `index` serves lookups; `order` keeps insertion order and its write lock
/// is held by every membership change, so both always agree.
pub struct PrinterRegistry {
    probe: Arc<dyn DeviceProbe>,
    events: EventBus,
    index: DashMap<PrinterId, Arc<Printer>>,
    order: RwLock<Vec<PrinterId>>,
}

impl PrinterRegistry {
    pub fn new(probe: Arc<dyn DeviceProbe>, events: EventBus) -> Self {
        PrinterRegistry {
            probe,
            events,
            index: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Validates and appends a printer with an empty snapshot.
    ///
    /// Emits [`MonitorEvent::Added`] before returning; no network traffic
    /// happens here.
    pub fn add(&self, name: &str, address: &str) -> Result<PrinterId, ValidationError> {
        let name = name.trim();
        ensure!(!name.is_empty(), EmptyNameSnafu);
        let input = address.trim();
        let address: IpAddr = input.parse().context(InvalidAddressSnafu { input })?;
        let id = PrinterId::new(address);

        {
            let mut order = self.order.write().unwrap_or_else(PoisonError::into_inner);
            ensure!(!self.index.contains_key(&id), DuplicateAddressSnafu { address });
            let printer = Printer::new(name.to_string(), id, self.probe.clone(), self.events.clone());
            self.index.insert(id, Arc::new(printer));
            order.push(id);
        }

        info!("Added printer {} ({})", name, id);
        self.events.emit(MonitorEvent::Added(id));
        Ok(id)
    }

    /// Removes the printer if present. Returns whether anything was removed.
    pub fn remove(&self, id: PrinterId) -> bool {
        let removed = {
            let mut order = self.order.write().unwrap_or_else(PoisonError::into_inner);
            let removed = self.index.remove(&id);
            if removed.is_some() {
                order.retain(|member| *member != id);
            }
            removed
        };

        match removed {
            Some((_, printer)) => {
                info!("Removed printer {} ({})", printer.name(), id);
                printer.retire();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: PrinterId) -> Option<Arc<Printer>> {
        self.index.get(&id).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<PrinterView> {
        self.printers()
            .into_iter()
            .map(|printer| PrinterView {
                id: printer.id(),
                name: printer.name().to_string(),
                snapshot: printer.snapshot(),
            })
            .collect()
    }

    /// Current membership, in insertion order.
    pub(crate) fn printers(&self) -> Vec<Arc<Printer>> {
        let order = self.order.read().unwrap_or_else(PoisonError::into_inner);
        order.iter().filter_map(|id| self.get(*id)).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum ValidationError {
    #[snafu(display("Printer name must not be empty"))]
    EmptyName,

    #[snafu(display("'{input}' is not a valid IP address"))]
    InvalidAddress { input: String, source: AddrParseError },

    #[snafu(display("A printer with address {address} is already registered"))]
    DuplicateAddress { address: IpAddr },
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::monitor::fakes::ScriptedProbe;

    fn registry() -> (PrinterRegistry, EventBus) {
        let bus = EventBus::new(64);
        (PrinterRegistry::new(Arc::new(ScriptedProbe::default()), bus.clone()), bus)
    }

    #[test]
    fn added_printer_is_listed_with_unknown_status() {
        let (registry, _) = registry();
        let id = registry.add("Lobby-1", "10.0.0.5").unwrap();

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, id);
        assert_eq!(list[0].name, "Lobby-1");
        assert_eq!(list[0].snapshot.status, None);
        assert_eq!(list[0].snapshot.device, None);
    }

    #[test]
    fn invalid_input_leaves_registry_unchanged() {
        let (registry, bus) = registry();
        let mut events = bus.subscribe();

        assert_eq!(registry.add("  ", "10.0.0.5"), Err(ValidationError::EmptyName));
        for address in ["", "10.0.0", "10.0.0.256", "printer.local", "10.0.0.5:631"] {
            assert!(
                matches!(registry.add("Lobby-1", address), Err(ValidationError::InvalidAddress { .. })),
                "{address} should be rejected"
            );
        }

        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn duplicate_addresses_are_rejected() {
        let (registry, _) = registry();
        registry.add("Lobby-1", "10.0.0.5").unwrap();

        assert!(matches!(
            registry.add("Lobby-2", " 10.0.0.5 "),
            Err(ValidationError::DuplicateAddress { .. })
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0].name, "Lobby-1");
    }

    #[test]
    fn names_need_not_be_unique_and_order_is_kept() {
        let (registry, _) = registry();
        registry.add("Office", "10.0.0.7").unwrap();
        registry.add("Office", "10.0.0.5").unwrap();
        registry.add("Lab", "fe80::1").unwrap();

        let addresses: Vec<String> = registry.list().iter().map(|view| view.id.to_string()).collect();
        assert_eq!(addresses, ["10.0.0.7", "10.0.0.5", "fe80::1"]);
    }

    #[test]
    fn remove_drops_the_printer_and_is_a_no_op_when_absent() {
        let (registry, bus) = registry();
        let mut events = bus.subscribe();
        let first = registry.add("A", "10.0.0.1").unwrap();
        let second = registry.add("B", "10.0.0.2").unwrap();

        assert!(registry.remove(first));
        assert!(!registry.remove(first));

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, second);
        assert!(registry.get(first).is_none());

        assert_eq!(events.try_recv().unwrap(), MonitorEvent::Added(first));
        assert_eq!(events.try_recv().unwrap(), MonitorEvent::Added(second));
        assert_eq!(events.try_recv().unwrap(), MonitorEvent::Removed(first));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn list_is_safe_during_concurrent_membership_changes() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = registry.add("P", &format!("10.{t}.0.{i}")).unwrap();
                        if i % 2 == 0 {
                            registry.remove(id);
                        }
                    }
                })
            })
            .collect();
        let reader = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let list = registry.list();
                    let mut ids: Vec<_> = list.iter().map(|view| view.id).collect();
                    ids.sort();
                    ids.dedup();
                    assert_eq!(ids.len(), list.len());
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(registry.len(), 100);
    }
}
