//! Descriptor registry
//!
//! Maps kind names and aliases to shared descriptors. Populated once during
//! start-up, then handed to the engine behind an `Arc` and never mutated.

use crate::error::{ReconcileError, Result};
use crate::resource::{ResourceDescriptor, StepInput};
use std::collections::HashMap;
use std::sync::Arc;

/// Name → descriptor table
#[derive(Debug, Default, Clone)]
pub struct Registry {
    by_name: HashMap<String, Arc<ResourceDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its kind and every alias.
    ///
    /// Fails if the descriptor is inconsistent or any name is taken.
    pub fn register(&mut self, descriptor: ResourceDescriptor) -> Result<()> {
        descriptor.check()?;
        let names: Vec<String> = std::iter::once(descriptor.kind.clone())
            .chain(descriptor.aliases.iter().cloned())
            .collect();
        if let Some(taken) = names.iter().find(|n| self.by_name.contains_key(*n)) {
            return Err(ReconcileError::validation(format!(
                "resource kind '{taken}' is registered twice"
            )));
        }
        let shared = Arc::new(descriptor);
        for name in names {
            self.by_name.insert(name, Arc::clone(&shared));
        }
        Ok(())
    }

    /// Register several descriptors, stopping at the first failure.
    pub fn register_all(
        &mut self,
        descriptors: impl IntoIterator<Item = ResourceDescriptor>,
    ) -> Result<()> {
        descriptors.into_iter().try_for_each(|d| self.register(d))
    }

    /// Look up a descriptor by kind or alias.
    pub fn get(&self, name: &str) -> Result<Arc<ResourceDescriptor>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownKind(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Primary kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self
            .by_name
            .iter()
            .filter(|(name, d)| *name == &d.kind)
            .map(|(name, _)| name.as_str())
            .collect();
        kinds.sort_unstable();
        kinds
    }

    /// Aliases pointing at `kind`, sorted.
    pub fn aliases_of(&self, kind: &str) -> Vec<&str> {
        let mut aliases: Vec<&str> = self
            .by_name
            .iter()
            .filter(|(name, d)| d.kind == kind && *name != kind)
            .map(|(name, _)| name.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }

    /// Check that every workflow step names a registered, non-workflow kind.
    ///
    /// Called once after all descriptors are registered.
    pub fn verify_workflows(&self) -> Result<()> {
        for kind in self.kinds() {
            let descriptor = self.get(kind)?;
            for step in &descriptor.workflow {
                let target = self.get(&step.kind).map_err(|_| {
                    ReconcileError::validation(format!(
                        "{kind}: step '{}' uses unknown kind '{}'",
                        step.name, step.kind
                    ))
                })?;
                if target.is_workflow() {
                    return Err(ReconcileError::validation(format!(
                        "{kind}: step '{}' cannot nest workflow '{}'",
                        step.name, step.kind
                    )));
                }
                for binding in &step.inputs {
                    if let StepInput::Output { step: from, name } = &binding.input {
                        let exported = descriptor
                            .workflow
                            .iter()
                            .filter(|s| &s.name == from)
                            .any(|s| s.outputs.iter().any(|o| &o.name == name));
                        if !exported {
                            return Err(ReconcileError::validation(format!(
                                "{kind}: step '{}' reads '{from}.{name}' which is never exported",
                                step.name
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.kinds().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
