//! Engine-level behavior tests, driven through the public control surface
//! with definitions loaded from raw payloads (the same path the UI uses).

use super::{Engine, EngineConfig};
use crate::state::{FsmState, NodeState, ProcessState, QueueState, SinkState};
use crate::value::Value;
use serde_json::json;

fn engine_with(payload: serde_json::Value) -> Engine {
    let mut engine = Engine::new();
    engine.load(&payload).expect("definition must validate");
    engine
}

fn sink_state<'a>(engine: &'a Engine, id: &str) -> &'a SinkState {
    match engine.state(id) {
        Some(NodeState::Sink(s)) => s,
        other => panic!("'{}' is not a sink: {:?}", id, other),
    }
}

fn queue_state<'a>(engine: &'a Engine, id: &str) -> &'a QueueState {
    match engine.state(id) {
        Some(NodeState::Queue(s)) => s,
        other => panic!("'{}' is not a queue: {:?}", id, other),
    }
}

fn process_state<'a>(engine: &'a Engine, id: &str) -> &'a ProcessState {
    match engine.state(id) {
        Some(NodeState::Process(s)) => s,
        other => panic!("'{}' is not a process: {:?}", id, other),
    }
}

fn fsm_state<'a>(engine: &'a Engine, id: &str) -> &'a FsmState {
    match engine.state(id) {
        Some(NodeState::Fsm(s)) => s,
        other => panic!("'{}' is not an fsm: {:?}", id, other),
    }
}

fn fixed_source(id: &str, value: f64, interval: u64, to: serde_json::Value) -> serde_json::Value {
    json!({
        "kind": "source", "id": id, "interval": interval,
        "range": {"min": value, "max": value},
        "outputs": [{"name": "out", "targets": to}]
    })
}

fn last_retained_value(engine: &Engine, sink: &str) -> Value {
    let state = sink_state(engine, sink);
    let token = *state.retained.back().expect("sink retained nothing");
    engine.token(token).expect("retained token unrecorded").value.clone()
}

#[test]
fn test_source_to_sink_end_to_end() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("src", 5.0, 1, json!([{"node": "snk"}])),
            {"kind": "sink", "id": "snk"}
        ]
    }));

    engine.step(1).unwrap();

    let sink = sink_state(&engine, "snk");
    assert_eq!(sink.consumed, 1);
    assert_eq!(sink.last_consumed, Some(1));
    assert_eq!(last_retained_value(&engine, "snk"), Value::Number(5.0));
}

#[test]
fn test_queue_aggregates_all_buffered_tokens_into_one() {
    // Three fixed sources land 2, 4, 6 in the queue during phase 1; the
    // same tick's aggregation pass sums them and the forwarding pass hands
    // the result to the sink.
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("s2", 2.0, 1, json!([{"node": "q"}])),
            fixed_source("s4", 4.0, 1, json!([{"node": "q"}])),
            fixed_source("s6", 6.0, 1, json!([{"node": "q"}])),
            {"kind": "queue", "id": "q", "capacity": 10, "method": "sum", "window": 1,
             "outputs": [{"name": "out", "targets": [{"node": "snk"}]}]},
            {"kind": "sink", "id": "snk"}
        ]
    }));

    engine.step(1).unwrap();

    let sink = sink_state(&engine, "snk");
    assert_eq!(sink.consumed, 1);
    assert_eq!(last_retained_value(&engine, "snk"), Value::Number(12.0));

    // The result token carries all three consumed tokens as lineage.
    let result = *sink.retained.back().unwrap();
    let record = engine.token(result).unwrap();
    assert_eq!(record.sources.len(), 3);
    assert_eq!(record.generation, 1);
    assert_eq!(record.ultimate_sources.len(), 3);

    let queue = queue_state(&engine, "q");
    assert!(queue.input.is_empty());
    assert!(queue.output.is_empty());
}

#[test]
fn test_queue_capacity_overflow_drops_and_logs() {
    // Capacity 1, window far away: the second arrival in the same tick is
    // dropped, logged, and the buffer keeps exactly one token.
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("a", 1.0, 1, json!([{"node": "q"}])),
            fixed_source("b", 2.0, 1, json!([{"node": "q"}])),
            {"kind": "queue", "id": "q", "capacity": 1, "method": "sum", "window": 100,
             "outputs": []}
        ]
    }));

    engine.step(1).unwrap();

    assert_eq!(queue_state(&engine, "q").input.len(), 1);
    assert_eq!(engine.stats().tokens_dropped, 1);
    assert!(engine
        .ledger()
        .for_node("q")
        .any(|e| e.action == crate::ledger::ActivityAction::TokenDropped));

    // The dropped token is decoupled, not forgotten: its record survives.
    let dropped = engine
        .lineage()
        .get(crate::lineage::TokenId(1))
        .expect("dropped token record must survive");
    assert!(dropped.history.iter().any(|h| h.detail.contains("dropped")));
}

#[test]
fn test_process_fires_only_when_every_input_is_ready() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("sa", 3.0, 1, json!([{"node": "p", "port": "a"}])),
            fixed_source("sb", 4.0, 2, json!([{"node": "p", "port": "b"}])),
            {"kind": "process", "id": "p",
             "inputs": [{"name": "a"}, {"name": "b"}],
             "outputs": [{"name": "out", "formula": "a + b",
                          "targets": [{"node": "snk"}]}]},
            {"kind": "sink", "id": "snk"}
        ]
    }));

    // Tick 1: only input 'a' has a token; the join gate holds the fire.
    engine.step(1).unwrap();
    assert_eq!(sink_state(&engine, "snk").consumed, 0);
    assert_eq!(process_state(&engine, "p").fires, 0);

    // Tick 2: 'sb' finally emits; one token is consumed per input and the
    // surplus on 'a' stays queued.
    engine.step(1).unwrap();
    assert_eq!(sink_state(&engine, "snk").consumed, 1);
    assert_eq!(last_retained_value(&engine, "snk"), Value::Number(7.0));

    let process = process_state(&engine, "p");
    assert_eq!(process.fires, 1);
    assert_eq!(process.buffers[0].tokens.len(), 1); // surplus on 'a'
    assert_eq!(process.buffers[1].tokens.len(), 0);
}

#[test]
fn test_process_chain_cascades_within_one_tick() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("src", 5.0, 1, json!([{"node": "p1", "port": "in"}])),
            {"kind": "process", "id": "p1",
             "inputs": [{"name": "in"}],
             "outputs": [{"name": "out", "formula": "in * 2",
                          "targets": [{"node": "p2", "port": "in"}]}]},
            {"kind": "process", "id": "p2",
             "inputs": [{"name": "in"}],
             "outputs": [{"name": "out", "formula": "in + 1",
                          "targets": [{"node": "snk"}]}]},
            {"kind": "sink", "id": "snk"}
        ]
    }));

    engine.step(1).unwrap();

    let sink = sink_state(&engine, "snk");
    assert_eq!(sink.consumed, 1);
    assert_eq!(sink.last_consumed, Some(1));
    assert_eq!(last_retained_value(&engine, "snk"), Value::Number(11.0));

    let result = *sink.retained.back().unwrap();
    assert_eq!(engine.token(result).unwrap().generation, 2);
}

#[test]
fn test_ungated_process_cycle_hits_cascade_cap() {
    let mut engine = Engine::with_config(EngineConfig {
        cascade_cap: 16,
        ..EngineConfig::default()
    });
    engine
        .load(&json!({
            "nodes": [
                fixed_source("src", 1.0, 1, json!([{"node": "p1", "port": "in"}])),
                {"kind": "process", "id": "p1",
                 "inputs": [{"name": "in"}],
                 "outputs": [{"name": "out", "formula": "in",
                              "targets": [{"node": "p2", "port": "in"}]}]},
                {"kind": "process", "id": "p2",
                 "inputs": [{"name": "in"}],
                 "outputs": [{"name": "out", "formula": "in",
                              "targets": [{"node": "p1", "port": "in"}]}]}
            ]
        }))
        .unwrap();

    // The validator already warned about the ungated cycle at load.
    assert!(engine.messages().iter().any(|m| m.contains("cascade cap")));

    engine.step(1).unwrap();

    assert_eq!(engine.stats().cascade_overflows, 1);
    assert!(engine
        .messages()
        .iter()
        .any(|m| m.contains("cascade overflow")));

    // The tick completed and the engine keeps working.
    engine.step(1).unwrap();
    assert_eq!(engine.tick(), 2);
}

#[test]
fn test_formula_error_is_isolated_per_output() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("src", 5.0, 1, json!([{"node": "p", "port": "in"}])),
            {"kind": "process", "id": "p",
             "inputs": [{"name": "in"}],
             "outputs": [
                 {"name": "bad", "formula": "in +* 2",
                  "targets": [{"node": "snk_bad"}]},
                 {"name": "good", "formula": "in * 2",
                  "targets": [{"node": "snk_good"}]}
             ]},
            {"kind": "sink", "id": "snk_bad"},
            {"kind": "sink", "id": "snk_good"}
        ]
    }));

    engine.step(1).unwrap();

    // The bad output failed and was surfaced; the good one still fired.
    assert_eq!(sink_state(&engine, "snk_bad").consumed, 0);
    assert_eq!(sink_state(&engine, "snk_good").consumed, 1);
    assert_eq!(last_retained_value(&engine, "snk_good"), Value::Number(10.0));
    assert!(engine.messages().iter().any(|m| m.contains("output 'bad'")));
    assert!(engine
        .ledger()
        .for_node("p")
        .any(|e| e.action == crate::ledger::ActivityAction::Error));
}

#[test]
fn test_fsm_token_received_transition_runs_actions_and_emits() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("src", 9.0, 1, json!([{"node": "m", "port": "sig"}])),
            {"kind": "fsm", "id": "m",
             "inputs": [{"name": "sig"}],
             "outputs": [{"name": "alert", "targets": [{"node": "snk"}]}],
             "machine": {
                 "initial": "idle",
                 "variables": {"count": 0},
                 "states": [
                     {"name": "idle",
                      "on_exit": [{"action": "log", "message": "leaving idle"}]},
                     {"name": "active",
                      "on_entry": [
                          {"action": "increment", "name": "count"},
                          {"action": "emit", "output": "alert", "value": 1}
                      ]}
                 ],
                 "transitions": [
                     {"from": "idle", "to": "active",
                      "trigger": {"kind": "token_received", "input": "sig"}}
                 ]
             }},
            {"kind": "sink", "id": "snk"}
        ]
    }));

    engine.step(1).unwrap();

    let fsm = fsm_state(&engine, "m");
    assert_eq!(fsm.machine.current, "active");
    assert_eq!(fsm.machine.previous.as_deref(), Some("idle"));
    assert_eq!(fsm.machine.changed_at, 1);
    assert_eq!(fsm.machine.history.len(), 1);
    assert_eq!(fsm.variables.get("count"), Some(&Value::Number(1.0)));

    // The emit action landed in the sink within the same tick.
    let sink = sink_state(&engine, "snk");
    assert_eq!(sink.consumed, 1);
    assert_eq!(last_retained_value(&engine, "snk"), Value::Number(1.0));

    // on_exit ran: the idle state's log action produced a ledger entry.
    assert!(engine
        .ledger()
        .for_node("m")
        .any(|e| e.details == "leaving idle"));
}

#[test]
fn test_fsm_timer_transition_fires_against_logical_clock() {
    let mut engine = engine_with(json!({
        "nodes": [
            {"kind": "fsm", "id": "m",
             "machine": {
                 "initial": "idle",
                 "states": [{"name": "idle"}, {"name": "done"}],
                 "transitions": [
                     {"from": "idle", "to": "done",
                      "trigger": {"kind": "timer", "interval": 2}}
                 ]
             }}
        ]
    }));

    engine.step(1).unwrap();
    assert_eq!(fsm_state(&engine, "m").machine.current, "idle");

    engine.step(1).unwrap();
    let fsm = fsm_state(&engine, "m");
    assert_eq!(fsm.machine.current, "done");
    assert_eq!(fsm.machine.history.back().unwrap().trigger, "timer");
}

#[test]
fn test_fsm_condition_transition_reads_variables() {
    let mut engine = engine_with(json!({
        "nodes": [
            {"kind": "fsm", "id": "m",
             "machine": {
                 "initial": "idle",
                 "variables": {"armed": true},
                 "states": [{"name": "idle"}, {"name": "done"}],
                 "transitions": [
                     {"from": "idle", "to": "done",
                      "trigger": {"kind": "condition", "expr": "armed"}}
                 ]
             }}
        ]
    }));

    engine.step(1).unwrap();
    assert_eq!(fsm_state(&engine, "m").machine.current, "done");
}

#[test]
fn test_enhanced_fsm_forwards_only_to_sinks() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("src", 5.0, 1, json!([{"node": "e"}])),
            {"kind": "enhanced_fsm", "id": "e",
             "outputs": [{"name": "out", "targets": [
                 {"node": "snk"},
                 {"node": "q"}
             ]}]},
            {"kind": "sink", "id": "snk"},
            {"kind": "queue", "id": "q", "capacity": 10, "method": "sum", "window": 100,
             "outputs": []}
        ]
    }));

    engine.step(1).unwrap();

    // The drain pass runs after source emission, so the token moved this
    // tick — but only to the sink.
    assert_eq!(sink_state(&engine, "snk").consumed, 1);
    assert!(queue_state(&engine, "q").input.is_empty());
}

#[test]
fn test_module_bootstraps_but_rejects_deliveries() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("src", 1.0, 1, json!([{"node": "mod"}])),
            {"kind": "module", "id": "mod"}
        ]
    }));

    assert!(matches!(
        engine.state("mod"),
        Some(NodeState::Module(_))
    ));

    engine.step(1).unwrap();
    assert!(engine
        .messages()
        .iter()
        .any(|m| m.contains("cannot receive")));
}

#[test]
fn test_snapshot_undo_redo_restores_checkpoints() {
    let def_a = json!({
        "nodes": [
            fixed_source("src", 5.0, 1, json!([{"node": "snk"}])),
            {"kind": "sink", "id": "snk"}
        ]
    });
    let def_b = json!({
        "nodes": [
            fixed_source("src", 5.0, 1, json!([{"node": "snk"}])),
            {"kind": "sink", "id": "snk"},
            {"kind": "sink", "id": "extra"}
        ]
    });

    let mut engine = engine_with(def_a);
    engine.save_snapshot("a").unwrap();

    engine.step(3).unwrap();
    assert_eq!(engine.tick(), 3);

    // Structural edit, then its checkpoint.
    engine.load(&def_b).unwrap();
    engine.save_snapshot("b").unwrap();
    assert_eq!(engine.definition().unwrap().node_count(), 3);

    // Undo reverts the edit and rebuilds runtime state from scratch.
    assert!(engine.undo());
    assert_eq!(engine.definition().unwrap().node_count(), 2);
    assert_eq!(engine.tick(), 0);
    assert_eq!(engine.lineage().len(), 0);
    assert_eq!(engine.ledger().global_len(), 0);

    assert!(engine.redo());
    assert_eq!(engine.definition().unwrap().node_count(), 3);

    // Nothing left to redo.
    assert!(!engine.redo());
}

#[test]
fn test_load_while_running_is_a_silent_no_op() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("src", 5.0, 1, json!([{"node": "snk"}])),
            {"kind": "sink", "id": "snk"}
        ]
    }));
    engine.step(2).unwrap();
    engine.play();

    let before = serde_json::to_value(engine.definition().unwrap()).unwrap();
    let tick_before = engine.tick();

    let result = engine.load(&json!({
        "nodes": [{"kind": "sink", "id": "other"}]
    }));

    assert!(result.is_ok());
    assert!(engine.is_running());
    assert_eq!(engine.tick(), tick_before);
    let after = serde_json::to_value(engine.definition().unwrap()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_invalid_load_fails_closed() {
    let mut engine = engine_with(json!({
        "nodes": [{"kind": "sink", "id": "snk"}]
    }));

    let errors = engine
        .load(&json!({
            "nodes": [
                fixed_source("src", 1.0, 1, json!([{"node": "ghost"}]))
            ]
        }))
        .unwrap_err();

    assert!(!errors.is_empty());
    assert!(engine.definition().is_none());
    assert!(engine.states().is_empty());
    assert!(engine.step(1).is_err());
}

#[test]
fn test_play_pause_gate_the_poll_loop() {
    let mut engine = engine_with(json!({
        "nodes": [{"kind": "sink", "id": "snk"}]
    }));

    assert!(!engine.poll());

    engine.play();
    assert!(engine.poll());
    assert!(engine.poll());
    assert_eq!(engine.tick(), 2);

    engine.pause();
    assert!(!engine.poll());
    assert_eq!(engine.tick(), 2);
}

#[test]
fn test_lineage_survives_sink_retention_eviction() {
    let mut engine = engine_with(json!({
        "nodes": [
            fixed_source("src", 5.0, 1, json!([{"node": "snk"}])),
            {"kind": "sink", "id": "snk", "retain_limit": 1}
        ]
    }));

    engine.step(2).unwrap();

    let sink = sink_state(&engine, "snk");
    assert_eq!(sink.consumed, 2);
    assert_eq!(sink.retained.len(), 1);

    // The first token was evicted from retention but its record, history
    // and trace are still resolvable.
    let first = crate::lineage::TokenId(0);
    assert!(engine.token(first).is_some());
    let trace = engine.trace_lineage(first);
    assert!(trace.contains("LINEAGE TRACE"));
}

#[test]
fn test_rng_seed_makes_ranged_draws_reproducible() {
    let payload = json!({
        "nodes": [
            {"kind": "source", "id": "src", "interval": 1,
             "range": {"min": 0.0, "max": 100.0},
             "outputs": [{"name": "out", "targets": [{"node": "snk"}]}]},
            {"kind": "sink", "id": "snk"}
        ]
    });

    let mut first = engine_with(payload.clone());
    let mut second = engine_with(payload);
    first.step(5).unwrap();
    second.step(5).unwrap();

    let values = |engine: &Engine| -> Vec<Value> {
        sink_state(engine, "snk")
            .retained
            .iter()
            .map(|&t| engine.token(t).unwrap().value.clone())
            .collect()
    };
    assert_eq!(values(&first), values(&second));
}
