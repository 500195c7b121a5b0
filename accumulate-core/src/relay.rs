//! Broadcast of signed synthetic transactions to sibling subnets.
//!
//! The relay is an injected interface so that state mutation stays
//! deterministic regardless of leadership: followers simply never queue.
//! Broadcast failures are logged and never abort a committed block; the
//! synthetic record is already on-chain and a later mechanism retries.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use accumulate_base::encoding::AccEncode;
use accumulate_base::{sha256, Hash256};
use accumulate_types::Envelope;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay: no subnet routes {0:#018x}")]
    NoRoute(u64),

    #[error("relay: transport: {0}")]
    Transport(String),
}

/// Queues signed envelopes for broadcast; drained once per block.
pub trait Relay: Send + Sync {
    /// Queues an envelope for its destination subnet and returns a broadcast
    /// reference id.
    fn queue(&self, envelope: &Envelope) -> Result<Hash256, RelayError>;

    /// Sends everything queued since the last call, grouped by subnet.
    fn batch_send(&self);
}

/// Hands one batch of marshaled envelopes to a destination subnet.
pub trait Transport: Send + Sync {
    fn broadcast(&self, subnet: &str, envelopes: Vec<Vec<u8>>) -> Result<(), String>;
}

/// Selects the subnet claiming the routing prefix. The `networks` list is
/// treated as a ring over the 64-bit routing space.
pub fn route_subnet(routing: u64, subnet_count: usize) -> usize {
    debug_assert!(subnet_count > 0);
    ((routing as u128 * subnet_count as u128) >> 64) as usize
}

/// Groups queued envelopes by destination subnet and submits each group once
/// per block.
pub struct BatchRelay {
    networks: Vec<String>,
    transport: Box<dyn Transport>,
    pending: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
}

impl BatchRelay {
    pub fn new(networks: Vec<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            networks,
            transport,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl Relay for BatchRelay {
    fn queue(&self, envelope: &Envelope) -> Result<Hash256, RelayError> {
        if self.networks.is_empty() {
            return Err(RelayError::NoRoute(envelope.routing));
        }
        let subnet = route_subnet(envelope.routing, self.networks.len());
        let raw = envelope.to_vec();
        let reference = Hash256::new(sha256(&raw));
        self.pending.lock().entry(subnet).or_default().push(raw);
        debug!(subnet = %self.networks[subnet], tx = %envelope.tx_hash(), "queued synthetic broadcast");
        Ok(reference)
    }

    fn batch_send(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (subnet, envelopes) in drained {
            let name = &self.networks[subnet];
            let count = envelopes.len();
            if let Err(message) = self.transport.broadcast(name, envelopes) {
                // The block is already committed; the synthetic records are
                // on-chain and will be retried by the recovery path.
                warn!(subnet = %name, count, %message, "synthetic broadcast failed");
            }
        }
    }
}

/// Relay that drops everything. Followers and tests.
#[derive(Default)]
pub struct NullRelay;

impl Relay for NullRelay {
    fn queue(&self, envelope: &Envelope) -> Result<Hash256, RelayError> {
        Ok(envelope.tx_hash())
    }

    fn batch_send(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn route_subnet_covers_the_ring() {
        assert_eq!(route_subnet(0, 4), 0);
        assert_eq!(route_subnet(u64::MAX, 4), 3);
        assert_eq!(route_subnet(u64::MAX / 2, 4), 1);
        for n in 1..8usize {
            assert!(route_subnet(u64::MAX, n) < n);
        }
    }

    #[test]
    fn identical_routing_identical_subnet() {
        assert_eq!(route_subnet(42, 3), route_subnet(42, 3));
    }

    struct CountingTransport(Arc<AtomicUsize>);

    impl Transport for CountingTransport {
        fn broadcast(&self, _subnet: &str, envelopes: Vec<Vec<u8>>) -> Result<(), String> {
            self.0.fetch_add(envelopes.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn null_relay_accepts_and_drops() {
        use accumulate_base::Url;
        use accumulate_types::SyntheticGenesis;

        let relay = NullRelay;
        let dest = Url::parse("acc://alice").unwrap();
        let envelope = Envelope::new(&dest, &SyntheticGenesis {});
        assert_eq!(relay.queue(&envelope).unwrap(), envelope.tx_hash());
        relay.batch_send();
    }

    #[test]
    fn batch_relay_groups_and_drains() {
        use accumulate_base::Url;
        use accumulate_types::SyntheticGenesis;

        let sent = Arc::new(AtomicUsize::new(0));
        let relay = BatchRelay::new(
            vec!["bvc0".into(), "bvc1".into()],
            Box::new(CountingTransport(sent.clone())),
        );

        let dest = Url::parse("acc://alice").unwrap();
        let envelope = Envelope::new(&dest, &SyntheticGenesis {});
        relay.queue(&envelope).unwrap();
        relay.queue(&envelope).unwrap();
        assert_eq!(sent.load(Ordering::SeqCst), 0);

        relay.batch_send();
        assert_eq!(sent.load(Ordering::SeqCst), 2);

        // A second drain sends nothing.
        relay.batch_send();
        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }
}
