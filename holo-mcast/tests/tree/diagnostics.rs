//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use const_addrs::ip;
use holo_mcast::events::Event;
use holo_mcast::service::NodeId;
use holo_mcast::store::McastRole;
use holo_mcast::test::stub::{Fabric, cp};
use maplit::btreemap;

use crate::topology::*;

#[test]
fn tree_paths() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.add_sink(&local_sink());

    let paths = topo.instance.paths(GROUP);
    assert_eq!(paths, btreemap! {
        cp("D1", 2) => vec![cp("D1", 1), cp("D1", 2)],
        cp("D3", 5) => vec![
            cp("D1", 1),
            cp("D1", 10),
            cp("D2", 1),
            cp("D2", 2),
            cp("D3", 10),
            cp("D3", 5),
        ],
        cp("D4", 2) => vec![
            cp("D1", 1),
            cp("D1", 10),
            cp("D2", 1),
            cp("D2", 3),
            cp("D4", 10),
            cp("D4", 2),
        ],
    });
}

#[test]
fn tree_paths_unknown_group() {
    let topo = Topology::new();
    scenario_b(&topo);

    assert!(topo.instance.paths(ip!("239.9.9.9")).is_empty());
}

#[test]
fn next_ids() {
    let topo = Topology::new();
    topo.add_sink(&sink_t());

    let next_ids = topo.instance.next_ids(Some(GROUP));
    assert_eq!(next_ids.len(), 3);
    let devices = next_ids
        .keys()
        .map(|key| key.device_id().as_str())
        .collect::<Vec<_>>();
    assert_eq!(devices, ["D1", "D2", "D3"]);
    for (key, next_id) in &next_ids {
        let nexts = topo.next_objectives(key.device_id().as_str());
        assert_eq!(nexts[0].id, *next_id);
    }

    assert!(topo.instance.next_ids(Some(ip!("239.9.9.9"))).is_empty());
}

#[test]
fn roles() {
    let topo = Topology::new();
    scenario_b(&topo);

    let roles = topo
        .instance
        .roles(Some(GROUP), Some(&source()))
        .into_iter()
        .map(|(key, role)| (key.device_id().as_str().to_owned(), role))
        .collect::<Vec<_>>();
    assert_eq!(roles, [
        ("D1".to_owned(), McastRole::Ingress),
        ("D2".to_owned(), McastRole::Transit),
        ("D3".to_owned(), McastRole::Egress),
        ("D4".to_owned(), McastRole::Egress),
    ]);

    let other_source = cp("D4", 1);
    assert!(topo.instance.roles(None, Some(&other_source)).is_empty());
}

#[test]
fn leaders() {
    let topo = Topology::new();
    let group2 = ip!("239.2.2.2");
    topo.instance.process_event(Event::RouteAdded { group: GROUP });
    topo.fabric.set_leader(Some("node-2"));
    topo.instance.process_event(Event::RouteAdded { group: group2 });

    assert_eq!(topo.instance.leaders(None), btreemap! {
        GROUP => NodeId::from(Fabric::LOCAL_NODE),
        group2 => NodeId::from("node-2"),
    });
    assert_eq!(topo.instance.leaders(Some(group2)), btreemap! {
        group2 => NodeId::from("node-2"),
    });
}
