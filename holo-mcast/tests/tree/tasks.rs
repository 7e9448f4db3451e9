//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use holo_mcast::config::McastCfg;
use holo_mcast::events::Event;
use holo_mcast::objective::{ObjectiveError, Operation};
use holo_mcast::store::McastRole;
use holo_mcast::test::stub::Objective;
use maplit::btreeset;

use crate::topology::*;

// Waits until the given condition holds, giving up after one second.
async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn is_verify(objective: &Objective) -> bool {
    matches!(
        objective,
        Objective::Next(_, next) if next.op == Operation::Verify
    )
}

// Input:
//  * Instance started with sinks T and U already known
// Output:
//  * Both sinks connected before any event is received
//  * A restart leaves the tree untouched
#[tokio::test]
async fn start_connects_pending_sinks() {
    let topo = Topology::new();
    topo.fabric.add_sink(GROUP, &sink_t());
    topo.fabric.add_sink(GROUP, &sink_u());

    let tasks = topo.instance.start();
    assert_eq!(topo.ports("D2"), Some(btreeset! {2, 3}));
    assert_eq!(topo.role("D4"), Some(McastRole::Egress));
    topo.instance.terminate(tasks);

    topo.fabric.take_objectives();
    let tasks = topo.instance.start();
    assert!(topo.fabric.objectives().is_empty());
    topo.instance.terminate(tasks);
}

#[tokio::test]
async fn start_not_leader() {
    let topo = Topology::new();
    topo.fabric.add_sink(GROUP, &sink_t());
    topo.fabric.set_leader(Some("node-2"));

    let tasks = topo.instance.start();
    assert!(topo.store.next_entries().is_empty());
    topo.instance.terminate(tasks);
}

#[tokio::test]
async fn event_loop() {
    let topo = Topology::new();
    let tasks = topo.instance.start();

    topo.fabric.add_sink(GROUP, &sink_t());
    let event = Event::SinkAdded {
        group: GROUP,
        source: source(),
        sink: sink_t(),
    };
    tasks.event_tx.send(event).unwrap();
    assert!(wait_for(|| topo.ports("D3").is_some()).await);
    assert_eq!(topo.role("D2"), Some(McastRole::Transit));

    topo.instance.terminate(tasks);
    assert!(topo.instance.leaders(None).is_empty());
}

// Input:
//  * Every objective fails while retries are enabled
// Output:
//  * The stored state is kept and re-asserted right away
#[tokio::test]
async fn objective_failure_retry() {
    let topo = Topology::with_config(McastCfg {
        objective_retry: true,
        ..config()
    });
    let tasks = topo.instance.start();

    let error = ObjectiveError::Failed("table full".to_owned());
    topo.fabric.set_objective_error(Some(error));
    topo.fabric.add_sink(GROUP, &sink_t());
    let event = Event::SinkAdded {
        group: GROUP,
        source: source(),
        sink: sink_t(),
    };
    tasks.event_tx.send(event).unwrap();

    let fabric = &topo.fabric;
    assert!(wait_for(|| fabric.objectives().iter().any(is_verify)).await);
    assert_eq!(topo.ports("D3"), Some(btreeset! {5}));
    topo.instance.terminate(tasks);
}

#[tokio::test]
async fn objective_failure_no_retry() {
    let topo = Topology::new();
    let tasks = topo.instance.start();

    let error = ObjectiveError::GroupMissing;
    topo.fabric.set_objective_error(Some(error));
    topo.fabric.add_sink(GROUP, &sink_t());
    let event = Event::SinkAdded {
        group: GROUP,
        source: source(),
        sink: sink_t(),
    };
    tasks.event_tx.send(event).unwrap();
    assert!(wait_for(|| topo.ports("D3").is_some()).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!topo.fabric.objectives().iter().any(is_verify));
    topo.instance.terminate(tasks);
}

#[tokio::test]
async fn bucket_corrector() {
    let topo = Topology::with_config(McastCfg {
        verify_initial_delay: 0,
        ..config()
    });
    topo.fabric.add_sink(GROUP, &sink_t());
    let tasks = topo.instance.start();

    let fabric = &topo.fabric;
    assert!(wait_for(|| fabric.objectives().iter().any(is_verify)).await);
    topo.instance.terminate(tasks);
}
