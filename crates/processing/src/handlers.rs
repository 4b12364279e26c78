//! Binding event types to handler methods and resolving them per request.

use std::any::TypeId;
use std::collections::HashMap;

use kestrel_artifacts::{ArtifactError, AssociatedType, EventType, EventTypes};

use crate::error::ProcessingError;
use crate::registration::{ArtifactBinding, KeySelector};

/// Handler methods of one processor, keyed by event type.
///
/// Methods bound to a Rust type are found through the association table;
/// methods bound directly to an event type artifact skip it.
#[derive(Debug)]
pub struct HandlerRegistry<M> {
    by_artifact: HashMap<EventType, M>,
    by_type: HashMap<TypeId, M>,
    bindings: Vec<ArtifactBinding>,
}

impl<M> Default for HandlerRegistry<M> {
    fn default() -> Self {
        Self {
            by_artifact: HashMap::new(),
            by_type: HashMap::new(),
            bindings: Vec::new(),
        }
    }
}

impl<M> HandlerRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `method` to the event type associated with `associated`.
    ///
    /// Fails with `TypeNotAssociated` when the type has no event type.
    pub fn bind_type(
        &mut self,
        event_types: &EventTypes,
        associated: AssociatedType,
        key_selector: Option<KeySelector>,
        method: M,
    ) -> Result<(), ProcessingError> {
        let event_type = event_types.get_for_type(&associated)?;
        self.ensure_unbound(&event_type)?;
        self.by_type.insert(associated.id(), method);
        self.bindings.push(ArtifactBinding {
            event_type,
            key_selector,
        });
        Ok(())
    }

    /// Bind `method` directly to `event_type`.
    pub fn bind_event_type(
        &mut self,
        event_type: EventType,
        key_selector: Option<KeySelector>,
        method: M,
    ) -> Result<(), ProcessingError> {
        self.ensure_unbound(&event_type)?;
        self.by_artifact.insert(event_type, method);
        self.bindings.push(ArtifactBinding {
            event_type,
            key_selector,
        });
        Ok(())
    }

    fn ensure_unbound(&self, event_type: &EventType) -> Result<(), ProcessingError> {
        if self.bindings.iter().any(|b| &b.event_type == event_type) {
            return Err(ProcessingError::invalid_registration(format!(
                "{event_type} is handled more than once"
            )));
        }
        Ok(())
    }

    /// Event types this processor handles, in binding order.
    pub fn bindings(&self) -> &[ArtifactBinding] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Method for an incoming event type.
    ///
    /// - direct artifact bindings win;
    /// - otherwise the artifact is mapped back to its Rust type
    ///   (`UnknownEventType` if nothing is associated with it);
    /// - an associated type nobody handles is `UnableToResolveEventType`.
    pub fn resolve(&self, event_type: &EventType, event_types: &EventTypes) -> Result<&M, ProcessingError> {
        if let Some(method) = self.by_artifact.get(event_type) {
            return Ok(method);
        }

        let associated = event_types
            .get_type_for(event_type)
            .map_err(|err| match err {
                ArtifactError::NoAssociation { .. } => ProcessingError::UnknownEventType {
                    event_type: *event_type,
                },
                other => ProcessingError::Artifact(other),
            })?;

        self.by_type
            .get(&associated.id())
            .ok_or(ProcessingError::UnableToResolveEventType {
                event_type: *event_type,
                type_name: associated.name(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_artifacts::EventTypeId;

    struct DishPrepared;
    struct DishServed;

    fn event_type(n: u128) -> EventType {
        EventType::first(EventTypeId::from_u128(n))
    }

    fn event_types() -> EventTypes {
        let mut types = EventTypes::new();
        types.associate::<DishPrepared>(event_type(1)).unwrap();
        types.associate::<DishServed>(event_type(2)).unwrap();
        types
    }

    #[test]
    fn resolves_typed_and_direct_bindings() {
        let types = event_types();
        let mut registry = HandlerRegistry::new();
        registry
            .bind_type(&types, AssociatedType::of::<DishPrepared>(), None, "prepared")
            .unwrap();
        registry.bind_event_type(event_type(9), None, "untyped").unwrap();

        assert_eq!(registry.resolve(&event_type(1), &types).unwrap(), &"prepared");
        assert_eq!(registry.resolve(&event_type(9), &types).unwrap(), &"untyped");
        assert_eq!(
            registry.bindings().iter().map(|b| b.event_type).collect::<Vec<_>>(),
            vec![event_type(1), event_type(9)]
        );
    }

    #[test]
    fn unknown_artifacts_are_unknown_event_types() {
        let types = event_types();
        let registry: HandlerRegistry<&str> = HandlerRegistry::new();

        assert_eq!(
            registry.resolve(&event_type(5), &types).unwrap_err(),
            ProcessingError::UnknownEventType {
                event_type: event_type(5)
            }
        );
    }

    #[test]
    fn associated_but_unhandled_types_cannot_be_resolved() {
        let types = event_types();
        let mut registry = HandlerRegistry::new();
        registry
            .bind_type(&types, AssociatedType::of::<DishPrepared>(), None, "prepared")
            .unwrap();

        match registry.resolve(&event_type(2), &types).unwrap_err() {
            ProcessingError::UnableToResolveEventType { type_name, .. } => {
                assert!(type_name.ends_with("DishServed"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unassociated_types_cannot_be_bound() {
        struct Unregistered;
        let types = event_types();
        let mut registry = HandlerRegistry::new();

        let err = registry
            .bind_type(&types, AssociatedType::of::<Unregistered>(), None, "nope")
            .unwrap_err();

        assert!(matches!(
            err,
            ProcessingError::Artifact(ArtifactError::TypeNotAssociated { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn event_types_are_handled_once() {
        let types = event_types();
        let mut registry = HandlerRegistry::new();
        registry
            .bind_type(&types, AssociatedType::of::<DishPrepared>(), None, "typed")
            .unwrap();

        let err = registry.bind_event_type(event_type(1), None, "direct").unwrap_err();

        assert!(matches!(err, ProcessingError::InvalidRegistration(_)));
    }
}
