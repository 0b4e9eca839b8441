//! Cross-node choreography over the shared bus.

#[cfg(test)]
mod network;

#[cfg(test)]
mod broadcast_flow;
#[cfg(test)]
mod quorum_flow;
#[cfg(test)]
mod recovery_flow;
