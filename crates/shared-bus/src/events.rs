//! # Blockchain Events
//!
//! Defines all event types that flow through the shared bus.
//! Payloads are defined in `shared-types/src/messages.rs`.

use serde::{Deserialize, Serialize};
use shared_types::messages::{
    ConsensusRequest, ConsensusVote, FullBlockRequest, FullBlockResponse, LeaderChange,
    LocalConsensusRequest, LocalVerified, MessageTarget, NetworkMessage, PosFinished,
    RecoveryState, RoleUpdate,
};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockchainEvent {
    // =========================================================================
    // INBOUND: CONSUMED BY BLOCK VERIFICATION
    // =========================================================================
    /// This node's role for the next height.
    /// Source: CA / topology service
    RoleUpdated(RoleUpdate),

    /// Leader (re-)election outcome.
    /// Source: leader election
    LeaderChanged(LeaderChange),

    /// Consensus request received from the network.
    /// Source: network layer
    ConsensusRequestReceived(ConsensusRequest),

    /// Consensus request built and executed by this node as leader.
    /// Source: block generation
    LocalRequestCreated(Box<LocalConsensusRequest>),

    /// Vote received from the network.
    /// Source: network layer
    VoteReceived(ConsensusVote),

    /// State recovery notice.
    /// Source: leader election
    RecoveryRequested(RecoveryState),

    /// A peer asks for a full block.
    /// Source: network layer
    FullBlockRequested(FullBlockRequest),

    /// A peer answered our full-block request.
    /// Source: network layer
    FullBlockReceived(Box<FullBlockResponse>),

    // =========================================================================
    // OUTBOUND: PUBLISHED BY BLOCK VERIFICATION
    // =========================================================================
    /// Local re-execution succeeded.
    /// Target: block generation
    LocalVerifyOk(Box<LocalVerified>),

    /// Quorum reached on a request.
    /// Target: block generation
    PosFinished(Box<PosFinished>),

    /// A broadcast node verified a posed block.
    /// Target: block generation
    BroadcastPosFinished(Box<LocalVerified>),

    /// Message to hand to the network layer.
    /// Target: network layer
    NetworkSend {
        target: MessageTarget,
        message: Box<NetworkMessage>,
    },
}

impl BlockchainEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::RoleUpdated(_) => EventTopic::RoleUpdate,
            Self::LeaderChanged(_) => EventTopic::LeaderChange,
            Self::ConsensusRequestReceived(_) => EventTopic::ConsensusRequest,
            Self::LocalRequestCreated(_) => EventTopic::LocalRequest,
            Self::VoteReceived(_) => EventTopic::Vote,
            Self::RecoveryRequested(_) => EventTopic::Recovery,
            Self::FullBlockRequested(_) | Self::FullBlockReceived(_) => EventTopic::FullBlock,
            Self::LocalVerifyOk(_) | Self::PosFinished(_) | Self::BroadcastPosFinished(_) => {
                EventTopic::VerifyResult
            }
            Self::NetworkSend { .. } => EventTopic::NetworkOutbound,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Role updates.
    RoleUpdate,
    /// Leader change notices.
    LeaderChange,
    /// Consensus requests from the network.
    ConsensusRequest,
    /// Locally built consensus requests.
    LocalRequest,
    /// Votes from the network.
    Vote,
    /// Recovery notices.
    Recovery,
    /// Full-block request/response traffic.
    FullBlock,
    /// Verification results for the generation pipeline.
    VerifyResult,
    /// Messages to be sent by the network layer.
    NetworkOutbound,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Create a filter for a single topic.
    #[must_use]
    pub fn topic(topic: EventTopic) -> Self {
        Self::topics(vec![topic])
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &BlockchainEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
