//! # Packet Handler Table
//!
//! Maps opcodes of one packet set to the closures the consumer thread
//! registered for them. Handlers are not `Send`: they run on the thread
//! that calls `drain`.

use std::collections::HashMap;
use std::fmt;

use packetforge_core::{PacketKind, PacketSet};

type Handler<C, S> = Box<dyn FnMut(C, S)>;

/// Opcode to handler table. `C` is the per-packet context (the sending peer
/// on a server, nothing on a client).
pub struct HandlerTable<S: PacketSet, C> {
    handlers: HashMap<u32, Handler<C, S>>,
}

impl<S: PacketSet, C: 'static> HandlerTable<S, C> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler of packet type `T`, replacing any previous one.
    pub fn register<T, F>(&mut self, mut handler: F)
    where
        T: PacketKind<S>,
        F: FnMut(C, T) + 'static,
    {
        let wrapped: Handler<C, S> = Box::new(move |context, packet| {
            if let Ok(packet) = T::from_set(packet) {
                handler(context, packet);
            }
        });
        if self.handlers.insert(T::OPCODE, wrapped).is_some() {
            tracing::debug!(packet = T::TYPE_NAME, "packet handler replaced");
        }
    }

    /// Whether a handler exists for `opcode`.
    #[inline]
    #[must_use]
    pub fn contains(&self, opcode: u32) -> bool {
        self.handlers.contains_key(&opcode)
    }

    /// Number of registered handlers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler of `packet`; false when none is registered.
    pub fn dispatch(&mut self, context: C, packet: S) -> bool {
        match self.handlers.get_mut(&packet.opcode()) {
            Some(handler) => {
                handler(context, packet);
                true
            }
            None => {
                tracing::debug!(packet = packet.type_name(), "no handler registered");
                false
            }
        }
    }
}

impl<S: PacketSet, C: 'static> Default for HandlerTable<S, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PacketSet, C> fmt::Debug for HandlerTable<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<&u32> = self.handlers.keys().collect();
        opcodes.sort_unstable();
        f.debug_struct("HandlerTable").field("opcodes", &opcodes).finish()
    }
}
