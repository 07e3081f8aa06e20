//! Session-scoped fan-out.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use seance_core::{ConnectionId, Envelope, SessionId};

use super::connection::Connection;
use super::registry::ConnectionRegistry;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Counts from one [`BroadcastCoordinator::broadcast`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections a send was attempted on.
    pub attempted: usize,
    /// Sends that were queued.
    pub delivered: usize,
    /// Connections removed because their send failed.
    pub pruned: usize,
}

/// Delivers envelopes to every connection in a session.
///
/// Each envelope is serialized once and queued on every target without
/// waiting. A failed send never affects other targets; the failing connection
/// is unregistered, which fires its close signal.
#[derive(Clone)]
pub struct BroadcastCoordinator {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastCoordinator {
    /// Create a coordinator over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Send `envelope` to every connection in `session_id` except `exclude`.
    pub fn broadcast(
        &self,
        session_id: &SessionId,
        envelope: &Envelope,
        exclude: Option<&ConnectionId>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let json = match envelope.to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(session_id = %session_id, event = %envelope.event, error = %e, "failed to encode broadcast");
                return report;
            }
        };

        let mut failed = Vec::new();
        for connection in self.registry.connections_of(session_id) {
            if exclude == Some(&connection.id) {
                continue;
            }
            report.attempted += 1;
            match connection.send(Arc::clone(&json)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        connection_id = %connection.id,
                        event = %envelope.event,
                        reason = e.reason(),
                        "broadcast send failed, pruning connection"
                    );
                    counter!(WS_BROADCAST_DROPS_TOTAL, "reason" => e.reason()).increment(1);
                    failed.push(connection.id.clone());
                }
            }
        }

        for connection_id in failed {
            if self.registry.unregister(session_id, &connection_id).is_some() {
                report.pruned += 1;
            }
        }

        debug!(
            session_id = %session_id,
            event = %envelope.event,
            attempted = report.attempted,
            delivered = report.delivered,
            pruned = report.pruned,
            "broadcast"
        );
        report
    }

    /// Send `envelope` to one connection. Failures are logged and dropped.
    pub fn send_to(&self, connection: &Connection, envelope: &Envelope) -> bool {
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(connection_id = %connection.id, error = %e, "failed to encode message");
                return false;
            }
        };
        match connection.send(Arc::new(json)) {
            Ok(()) => true,
            Err(e) => {
                warn!(connection_id = %connection.id, event = %envelope.event, error = %e, "unicast dropped");
                counter!(WS_BROADCAST_DROPS_TOTAL, "reason" => e.reason()).increment(1);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seance_core::{Identity, UserId};
    use tokio::sync::mpsc;

    struct Harness {
        coordinator: BroadcastCoordinator,
        session: SessionId,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                coordinator: BroadcastCoordinator::new(Arc::new(ConnectionRegistry::default())),
                session: SessionId::from("parlour"),
            }
        }

        fn join(&self, id: &str, capacity: usize) -> (Arc<Connection>, mpsc::Receiver<Arc<String>>) {
            let (tx, rx) = mpsc::channel(capacity);
            let conn = Arc::new(Connection::new(ConnectionId::from(id), tx));
            let identity = Identity::new(UserId::from(id), id).unwrap();
            let _ = self
                .coordinator
                .registry()
                .register(&self.session, Arc::clone(&conn), identity)
                .unwrap();
            (conn, rx)
        }
    }

    fn recv_event(rx: &mut mpsc::Receiver<Arc<String>>) -> Option<String> {
        rx.try_recv()
            .ok()
            .map(|json| Envelope::from_json(&json).unwrap().event)
    }

    #[test]
    fn reaches_every_connection() {
        let h = Harness::new();
        let mut rxs: Vec<_> = (0..4).map(|i| h.join(&format!("c{i}"), 8).1).collect();

        let report = h.coordinator.broadcast(&h.session, &Envelope::spirit_thinking(), None);
        assert_eq!(
            report,
            BroadcastReport {
                attempted: 4,
                delivered: 4,
                pruned: 0
            }
        );
        for rx in &mut rxs {
            assert_eq!(recv_event(rx).as_deref(), Some("spirit_thinking"));
        }
    }

    #[test]
    fn exclude_skips_one() {
        let h = Harness::new();
        let (a, mut ra) = h.join("a", 8);
        let (_b, mut rb) = h.join("b", 8);
        let (_c, mut rc) = h.join("c", 8);

        let report = h
            .coordinator
            .broadcast(&h.session, &Envelope::spirit_thinking(), Some(&a.id));
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert!(recv_event(&mut ra).is_none());
        assert!(recv_event(&mut rb).is_some());
        assert!(recv_event(&mut rc).is_some());
    }

    #[test]
    fn failed_send_is_isolated_and_pruned() {
        let h = Harness::new();
        let (_a, mut ra) = h.join("a", 8);
        let (dead, dead_rx) = h.join("dead", 8);
        let (_c, mut rc) = h.join("c", 8);
        drop(dead_rx);

        let report = h
            .coordinator
            .broadcast(&h.session, &Envelope::message_received("Ada", "Hi"), None);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.pruned, 1);
        assert_eq!(recv_event(&mut ra).as_deref(), Some("message_received"));
        assert_eq!(recv_event(&mut rc).as_deref(), Some("message_received"));

        let registry = h.coordinator.registry();
        assert!(dead.is_closed());
        assert_eq!(registry.connections_of(&h.session).len(), 2);
        assert!(
            registry
                .participants_of(&h.session)
                .iter()
                .all(|p| p.name != "dead")
        );
    }

    #[test]
    fn full_queue_is_pruned() {
        let h = Harness::new();
        let (slow, _slow_rx) = h.join("slow", 1);
        let (_fast, _fast_rx) = h.join("fast", 8);

        let first = h.coordinator.broadcast(&h.session, &Envelope::spirit_thinking(), None);
        assert_eq!(first.delivered, 2);
        let second = h.coordinator.broadcast(&h.session, &Envelope::spirit_thinking(), None);
        assert_eq!(second.delivered, 1);
        assert_eq!(second.pruned, 1);
        assert!(slow.is_closed());
    }

    #[test]
    fn sequential_broadcasts_keep_order() {
        let h = Harness::new();
        let (_a, mut ra) = h.join("a", 8);

        let _ = h
            .coordinator
            .broadcast(&h.session, &Envelope::message_received("Ada", "Hi"), None);
        let _ = h.coordinator.broadcast(&h.session, &Envelope::spirit_thinking(), None);
        let _ = h
            .coordinator
            .broadcast(&h.session, &Envelope::spirit_response("Yes.", 1, &[250, 150, 180, 300]), None);

        assert_eq!(recv_event(&mut ra).as_deref(), Some("message_received"));
        assert_eq!(recv_event(&mut ra).as_deref(), Some("spirit_thinking"));
        assert_eq!(recv_event(&mut ra).as_deref(), Some("spirit_response"));
    }

    #[test]
    fn unknown_session_is_a_no_op() {
        let h = Harness::new();
        let report = h
            .coordinator
            .broadcast(&SessionId::from("empty"), &Envelope::spirit_thinking(), None);
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn send_to_reports_failure() {
        let h = Harness::new();
        let (a, mut ra) = h.join("a", 8);
        assert!(h.coordinator.send_to(&a, &Envelope::error("nope", Some("EMPTY_MESSAGE"))));
        assert_eq!(recv_event(&mut ra).as_deref(), Some("error"));

        drop(ra);
        assert!(!h.coordinator.send_to(&a, &Envelope::spirit_thinking()));
        // Unicast failures do not prune.
        assert_eq!(h.coordinator.registry().connection_count(), 1);
    }
}
