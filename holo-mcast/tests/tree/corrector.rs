//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::time::Duration;

use holo_mcast::config::McastCfg;
use holo_mcast::events::Event;
use holo_mcast::fabric::{DeviceId, PortNumber};
use holo_mcast::objective::Operation;
use holo_mcast::tasks::messages::input::RetryMsg;
use holo_mcast::test::stub::{Fabric, Objective};
use maplit::{btreemap, btreeset};

use crate::topology::*;

// Returns the ports re-asserted on each device.
fn verified(objectives: Vec<Objective>) -> BTreeMap<String, Vec<u32>> {
    objectives
        .into_iter()
        .map(|objective| match objective {
            Objective::Next(device_id, next) => {
                assert_eq!(next.op, Operation::Verify);
                let ports = next.ports.iter().map(|port| port.0).collect();
                (device_id.as_str().to_owned(), ports)
            }
            objective => panic!("unexpected objective: {objective:?}"),
        })
        .collect()
}

// Input:
//  * Bucket corrector runs twice on the tree serving T and U
// Output:
//  * Every device of the tree re-asserts its stored ports, identically on
//    both runs
#[test]
fn corrector_run() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.add_sink(&local_sink());
    let next_ids = topo.instance.next_ids(None);
    topo.fabric.take_objectives();

    assert!(topo.instance.is_stable());
    topo.instance.run_bucket_corrector();
    let first = topo.fabric.take_objectives();
    assert_eq!(verified(first.clone()), btreemap! {
        "D1".to_owned() => vec![2, 10],
        "D2".to_owned() => vec![2, 3],
        "D3".to_owned() => vec![5],
        "D4".to_owned() => vec![2],
    });

    topo.instance.run_bucket_corrector();
    let second = topo.fabric.take_objectives();
    assert_eq!(first, second);
    assert_eq!(topo.instance.next_ids(None), next_ids);
}

#[test]
fn corrector_unstable() {
    let topo = Topology::with_config(McastCfg::default());
    scenario_b(&topo);
    topo.fabric.take_objectives();

    assert!(!topo.instance.is_stable());
    topo.instance.run_bucket_corrector();
    assert!(topo.fabric.objectives().is_empty());
}

// Input:
//  * Events leaving the forwarding state untouched, once the stability
//    threshold has elapsed
// Output:
//  * The state is still considered stable until a sink is connected
#[test]
fn corrector_stability_ignores_noop_events() {
    let topo = Topology::with_config(McastCfg {
        stability_threshold: 1,
        ..config()
    });
    std::thread::sleep(Duration::from_millis(1100));
    assert!(topo.instance.is_stable());

    topo.instance.process_event(Event::RouteAdded { group: GROUP });
    topo.fabric.set_master("D1", Some("node-2"));
    topo.add_sink(&sink_t());
    assert!(topo.instance.is_stable());

    topo.fabric.set_master("D1", Some(Fabric::LOCAL_NODE));
    topo.add_sink(&sink_t());
    assert!(!topo.instance.is_stable());
}

#[test]
fn corrector_not_master() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.fabric.take_objectives();
    topo.fabric.set_master("D1", None);

    topo.instance.run_bucket_corrector();
    assert!(topo.fabric.objectives().is_empty());
}

// Input:
//  * Bucket corrector runs while a sink is waiting for a path
// Output:
//  * Nothing is re-asserted
#[test]
fn corrector_missing_ingress() {
    let topo = Topology::new();
    topo.fabric.isolate("D3");
    topo.add_sink(&sink_t());
    topo.fabric.take_objectives();

    topo.instance.run_bucket_corrector();
    assert!(topo.fabric.objectives().is_empty());
}

// Input:
//  * Retry requested after an objective failure on D2
// Output:
//  * D2 re-asserts its stored ports
#[test]
fn retry() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.fabric.take_objectives();

    topo.instance.retry(RetryMsg {
        device_id: DeviceId::from("D2"),
        group: GROUP,
    });
    let nexts = topo.next_objectives("D2");
    assert_eq!(nexts.len(), 1);
    assert_eq!(nexts[0].op, Operation::Verify);
    assert_eq!(nexts[0].ports, btreeset! {PortNumber(2), PortNumber(3)});
    assert_eq!(topo.fabric.objectives().len(), 1);

    // Device no longer part of the tree.
    topo.fabric.take_objectives();
    topo.instance.retry(RetryMsg {
        device_id: DeviceId::from("D5"),
        group: GROUP,
    });
    assert!(topo.fabric.objectives().is_empty());
}
