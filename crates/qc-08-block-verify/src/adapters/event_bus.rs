//! Event bus adapters
//!
//! Outbound network messages and verification results are published onto
//! the shared bus, where the network layer and the generation pipeline pick
//! them up.

use crate::ports::{MessageSender, VerifyNotifier};
use shared_bus::{BlockchainEvent, InMemoryEventBus};
use shared_types::{LocalVerified, MessageTarget, NetworkMessage, PosFinished};
use std::sync::Arc;

/// Hands network messages to the bus as `NetworkSend` events.
#[derive(Clone)]
pub struct BusMessageSender {
    bus: Arc<InMemoryEventBus>,
}

impl BusMessageSender {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self { bus }
    }
}

impl MessageSender for BusMessageSender {
    fn send(&self, message: NetworkMessage, target: MessageTarget) -> Result<(), String> {
        self.bus.emit(BlockchainEvent::NetworkSend {
            target,
            message: Box::new(message),
        });
        Ok(())
    }
}

/// Publishes verification results to the bus.
#[derive(Clone)]
pub struct BusVerifyNotifier {
    bus: Arc<InMemoryEventBus>,
}

impl BusVerifyNotifier {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self { bus }
    }
}

impl VerifyNotifier for BusVerifyNotifier {
    fn local_verified(&self, verified: LocalVerified) {
        self.bus
            .emit(BlockchainEvent::LocalVerifyOk(Box::new(verified)));
    }

    fn pos_finished(&self, finished: PosFinished) {
        self.bus.emit(BlockchainEvent::PosFinished(Box::new(finished)));
    }

    fn broadcast_finished(&self, verified: LocalVerified) {
        self.bus
            .emit(BlockchainEvent::BroadcastPosFinished(Box::new(verified)));
    }
}
