//! The step driver: advances the logical clock and orchestrates the
//! strict per-tick processing order across node kinds.

use super::Engine;
use crate::graph::{NodeId, NodeKind};
use tracing::{debug, trace};

impl Engine {
    /// Advances the clock by exactly one and runs the tick phases.
    ///
    /// Phase order is fixed: (1) Source emission, (2) Fsm timer/condition
    /// transitions, (3) EnhancedFsm drain, (4) Queue aggregation, (5) Queue
    /// forwarding. Process nodes are not polled here — they fire from the
    /// cascade queue the moment a delivery lands in one of their buffers.
    /// Within each phase, nodes run in definition declaration order.
    pub(super) fn run_tick(&mut self) {
        self.tick += 1;
        debug!(tick = self.tick, "tick start");

        let def = self.def();
        let ids = |kind: NodeKind| -> Vec<NodeId> {
            def.ids_of_kind(kind).into_iter().cloned().collect()
        };

        for node in ids(NodeKind::Source) {
            trace!(%node, "phase: source emission");
            self.check_source_emission(&node);
        }

        for node in ids(NodeKind::Fsm) {
            trace!(%node, "phase: fsm clock transitions");
            self.tick_fsm(&node);
        }

        for node in ids(NodeKind::EnhancedFsm) {
            trace!(%node, "phase: enhanced drain");
            self.drain_enhanced(&node);
        }

        let queues = ids(NodeKind::Queue);
        for node in &queues {
            trace!(%node, "phase: queue aggregation");
            self.tick_queue_aggregation(node);
        }
        for node in &queues {
            trace!(%node, "phase: queue forwarding");
            self.tick_queue_forwarding(node);
        }
    }
}
