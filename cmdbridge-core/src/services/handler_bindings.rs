//! Live handler objects attached to declared commands.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use cmdbridge_common::traits::CommandHandler;

use crate::services::command_registry::CommandRegistry;

struct Binding {
    host_type: String,
    handler: Arc<dyn CommandHandler>,
}

/// Maps command names to the handlers that run them. Nothing can be bound
/// until a registry has been attached.
#[derive(Default)]
pub struct HandlerBindings {
    /// command name -> host type of its declaration
    hosts: Option<HashMap<String, String>>,
    bound: HashMap<String, Vec<Binding>>,
}

impl HandlerBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the bindings at `registry`. Existing bindings survive only for
    /// commands that still exist with the same host type.
    pub fn attach(&mut self, registry: &CommandRegistry) {
        let hosts: HashMap<String, String> = registry
            .declarations()
            .map(|d| (d.name.clone(), d.host_type.clone()))
            .collect();

        self.bound.retain(|name, list| {
            list.retain(|b| hosts.get(name) == Some(&b.host_type));
            !list.is_empty()
        });
        self.hosts = Some(hosts);
    }

    pub fn is_attached(&self) -> bool {
        self.hosts.is_some()
    }

    /// Binds `handler` to every command declared by `host_type`. Returns how
    /// many commands it was bound to.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>, host_type: &str) -> usize {
        let Some(hosts) = &self.hosts else {
            warn!("Handler for '{}' registered before any commands were loaded; ignoring", host_type);
            return 0;
        };

        let mut count = 0;
        for (name, host) in hosts {
            if host == host_type {
                self.bound.entry(name.clone()).or_default().push(Binding {
                    host_type: host_type.to_string(),
                    handler: Arc::clone(&handler),
                });
                count += 1;
            }
        }
        debug!("Bound handler for '{}' to {} command(s)", host_type, count);
        count
    }

    /// Removes one binding of exactly this handler from each of the host's
    /// commands. Returns how many bindings were removed.
    pub fn unregister(&mut self, handler: &Arc<dyn CommandHandler>, host_type: &str) -> usize {
        if self.hosts.is_none() {
            return 0;
        }

        let mut count = 0;
        for list in self.bound.values_mut() {
            if let Some(pos) = list
                .iter()
                .position(|b| b.host_type == host_type && Arc::ptr_eq(&b.handler, handler))
            {
                list.remove(pos);
                count += 1;
            }
        }
        self.bound.retain(|_, list| !list.is_empty());
        count
    }

    /// Handlers bound to `name`, in registration order.
    pub fn handlers_for(&self, name: &str) -> Vec<Arc<dyn CommandHandler>> {
        self.bound
            .get(name)
            .map(|list| list.iter().map(|b| Arc::clone(&b.handler)).collect())
            .unwrap_or_default()
    }

    pub fn bound_count(&self, name: &str) -> usize {
        self.bound.get(name).map_or(0, Vec::len)
    }
}
