use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use ovb_core::{DeclArena, EventId, ModuleId, ProcId};

use super::values::{new_slot, Slot, Value};

/// One live object of a module or class declaration. Field and static
/// storage are slot vectors indexed by declaration index; the subscriber
/// list holds weak references so event graphs never keep instances alive.
pub struct ModuleInstance {
    module: ModuleId,
    module_name: String,
    fields: Vec<Slot>,
    statics: Vec<Slot>,
    subscribers: Mutex<Vec<EventSubscription>>,
}

struct EventSubscription {
    subscriber: Weak<ModuleInstance>,
    event: EventId,
    handler: ProcId,
}

impl ModuleInstance {
    pub fn new(arena: &DeclArena, module: ModuleId) -> Arc<Self> {
        let decl = arena.module(module);
        let fields = decl
            .fields
            .iter()
            .map(|var| new_slot(Value::default_for(var.tag)))
            .collect();
        let statics = decl
            .statics
            .iter()
            .map(|var| new_slot(Value::default_for(var.tag)))
            .collect();
        Arc::new(Self {
            module,
            module_name: decl.name.clone(),
            fields,
            statics,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn field(&self, index: usize) -> Slot {
        self.fields[index].clone()
    }

    pub fn static_slot(&self, index: usize) -> Slot {
        self.statics[index].clone()
    }

    pub fn add_event_listener(
        &self,
        subscriber: &Arc<ModuleInstance>,
        event: EventId,
        handler: ProcId,
    ) {
        self.subscribers.lock().push(EventSubscription {
            subscriber: Arc::downgrade(subscriber),
            event,
            handler,
        });
    }

    /// Drops every subscription granted to the given subscriber, plus any
    /// whose subscriber has already been collected.
    pub fn remove_event_listener(&self, subscriber: &Arc<ModuleInstance>) {
        self.subscribers.lock().retain(|sub| {
            sub.subscriber
                .upgrade()
                .map(|live| !Arc::ptr_eq(&live, subscriber))
                .unwrap_or(false)
        });
    }

    /// Live subscriptions for one event, in subscription order.
    pub fn subscriptions_for(&self, event: EventId) -> Vec<(Arc<ModuleInstance>, ProcId)> {
        self.subscribers
            .lock()
            .iter()
            .filter(|sub| sub.event == event)
            .filter_map(|sub| sub.subscriber.upgrade().map(|live| (live, sub.handler)))
            .collect()
    }

    /// Scans this instance's class events for `<variable>_<event>` handler
    /// procedures on the subscriber's module and registers one subscription
    /// per match. Runs when a withevents variable is assigned.
    pub fn bind_event_handlers(
        self: &Arc<Self>,
        arena: &DeclArena,
        var_name: &str,
        subscriber: &Arc<ModuleInstance>,
    ) {
        for &event in &arena.module(self.module).events {
            let handler_name = format!("{}_{}", var_name, arena.event(event).name);
            if let Some(handler) = arena.find_proc(subscriber.module, &handler_name) {
                self.add_event_listener(subscriber, event, handler);
            }
        }
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(Instance {})", self.module_name)
    }
}
