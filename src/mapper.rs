//! Typed decoding of stored events.

use std::collections::HashMap;
use std::fmt;

use crate::aggregate::AggregateType;
use crate::error::{Error, Result};
use crate::event::{Event, EventType};

type Decoder<E> = Box<dyn Fn(&Event) -> Result<E> + Send + Sync>;

/// Maps `(aggregate type, event type)` to a decoder producing domain events.
///
/// Registration happens once at startup. Events without a registered
/// decoder fail with [`Error::UnknownEventType`] instead of being skipped.
pub struct EventRegistry<E> {
    decoders: HashMap<(AggregateType, EventType), Decoder<E>>,
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("registered", &self.decoders.len())
            .finish()
    }
}

impl<E> EventRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder, replacing any previous one for the same pair.
    pub fn register<F>(
        mut self,
        aggregate_type: impl Into<AggregateType>,
        event_type: impl Into<EventType>,
        decoder: F,
    ) -> Self
    where
        F: Fn(&Event) -> Result<E> + Send + Sync + 'static,
    {
        self.decoders
            .insert((aggregate_type.into(), event_type.into()), Box::new(decoder));
        self
    }

    pub fn decode(&self, event: &Event) -> Result<E> {
        let key = (
            event.aggregate.aggregate_type.clone(),
            event.event_type.clone(),
        );
        match self.decoders.get(&key) {
            Some(decoder) => decoder(event),
            None => Err(Error::UnknownEventType {
                aggregate_type: key.0.to_string(),
                event_type: key.1.to_string(),
            }),
        }
    }

    pub fn decode_all(&self, events: &[Event]) -> Result<Vec<E>> {
        events.iter().map(|event| self.decode(event)).collect()
    }

    /// Registered event types of `aggregate_type`, sorted.
    pub fn event_types(&self, aggregate_type: &AggregateType) -> Vec<EventType> {
        let mut types: Vec<EventType> = self
            .decoders
            .keys()
            .filter(|(agg, _)| agg == aggregate_type)
            .map(|(_, event_type)| event_type.clone())
            .collect();
        types.sort();
        types
    }
}
