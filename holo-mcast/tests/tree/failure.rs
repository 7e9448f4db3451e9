//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_mcast::events::Event;
use holo_mcast::fabric::DeviceId;
use holo_mcast::store::McastRole;
use holo_mcast::test::stub::cp;
use maplit::btreeset;

use crate::topology::*;

// Input:
//  * Link D1-D2 goes down while T and U are served through it
// Output:
//  * D2 leaves the tree, as well as the D1 port facing it
//  * T can only be reached through a detour crossing D4, so D3 leaves the
//    tree
//  * U is reached again through D5, and D4 stays EGRESS
#[test]
fn link_down_transit() {
    let topo = Topology::new();
    scenario_b(&topo);

    let link = topo.fabric.disconnect(&cp("D1", 10), &cp("D2", 1));
    topo.instance.process_event(Event::LinkDown(link));

    assert_eq!(topo.ports("D2"), None);
    assert_eq!(topo.role("D2"), None);
    assert_eq!(topo.ports("D3"), None);
    assert_eq!(topo.role("D3"), None);
    assert_eq!(topo.ports("D1"), Some(btreeset! {11}));
    assert_eq!(topo.role("D1"), Some(McastRole::Ingress));
    assert_eq!(topo.ports("D5"), Some(btreeset! {3}));
    assert_eq!(topo.role("D5"), Some(McastRole::Transit));
    assert_eq!(topo.ports("D4"), Some(btreeset! {2}));
    assert_eq!(topo.role("D4"), Some(McastRole::Egress));
    let transit = topo.devices(McastRole::Transit);
    assert_eq!(transit, btreeset! {DeviceId::from("D5")});

    // A second failure leaves U without any path.
    let link = topo.fabric.disconnect(&cp("D5", 3), &cp("D4", 11));
    topo.instance.process_event(Event::LinkDown(link));

    assert_eq!(topo.ports("D4"), None);
    assert_eq!(topo.role("D4"), None);
    assert_eq!(topo.ports("D5"), None);
    assert_eq!(topo.ports("D1"), None);
    assert!(topo.store.role_entries().is_empty());
}

// Input:
//  * Link D1-D2 goes down while only U is served through it
// Output:
//  * U is reached again through D5, which becomes TRANSIT
//  * D5 gets a filter on the port facing D1
#[test]
fn link_down_transit_single_sink() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.remove_sink(&sink_t());

    let link = topo.fabric.disconnect(&cp("D1", 10), &cp("D2", 1));
    topo.instance.process_event(Event::LinkDown(link));

    assert_eq!(topo.ports("D2"), None);
    assert_eq!(topo.role("D2"), None);
    assert_eq!(topo.ports("D1"), Some(btreeset! {11}));
    assert_eq!(topo.role("D1"), Some(McastRole::Ingress));
    assert_eq!(topo.ports("D5"), Some(btreeset! {3}));
    assert_eq!(topo.role("D5"), Some(McastRole::Transit));
    assert_eq!(topo.ports("D4"), Some(btreeset! {2}));
    assert_eq!(topo.role("D4"), Some(McastRole::Egress));

    let filters = topo.filtering_objectives("D5");
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].port.0, 1);
}

#[test]
fn link_down_keeps_local_sinks() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.add_sink(&local_sink());
    topo.remove_sink(&sink_t());

    let link = topo.fabric.disconnect(&cp("D1", 10), &cp("D2", 1));
    topo.instance.process_event(Event::LinkDown(link));

    assert_eq!(topo.ports("D1"), Some(btreeset! {2, 11}));
    assert_eq!(topo.role("D1"), Some(McastRole::Ingress));
    assert_eq!(topo.ports("D4"), Some(btreeset! {2}));
}

#[test]
fn link_down_unused() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.fabric.take_objectives();

    let link = topo.fabric.disconnect(&cp("D1", 11), &cp("D5", 1));
    topo.instance.process_event(Event::LinkDown(link));

    assert!(topo.fabric.objectives().is_empty());
    assert_eq!(topo.ports("D2"), Some(btreeset! {2, 3}));
}

#[test]
fn link_down_not_master() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.fabric.take_objectives();
    topo.fabric.set_master("D1", Some("node-2"));

    let link = topo.fabric.disconnect(&cp("D1", 10), &cp("D2", 1));
    topo.instance.process_event(Event::LinkDown(link));

    assert!(topo.fabric.objectives().is_empty());
    assert_eq!(topo.ports("D2"), Some(btreeset! {2, 3}));
    assert_eq!(topo.ports("D1"), Some(btreeset! {10}));
}

// Input:
//  * Spine D2 goes down while T and U are served through it
// Output:
//  * T can't be reached anymore and D3 leaves the tree
//  * U is reached again through D5
#[test]
fn device_down_transit() {
    let topo = Topology::new();
    scenario_b(&topo);

    topo.fabric.isolate("D2");
    let device_id = DeviceId::from("D2");
    topo.instance.process_event(Event::DeviceDown(device_id));

    assert_eq!(topo.ports("D2"), None);
    assert_eq!(topo.role("D2"), None);
    assert_eq!(topo.ports("D3"), None);
    assert_eq!(topo.role("D3"), None);
    assert_eq!(topo.ports("D1"), Some(btreeset! {11}));
    assert_eq!(topo.ports("D5"), Some(btreeset! {3}));
    assert_eq!(topo.ports("D4"), Some(btreeset! {2}));
    assert_eq!(topo.role("D4"), Some(McastRole::Egress));
}

// Input:
//  * Leaf D4 goes down
// Output:
//  * D4 leaves the tree
//  * T is still served through D2
#[test]
fn device_down_egress() {
    let topo = Topology::new();
    scenario_b(&topo);

    topo.fabric.isolate("D4");
    let device_id = DeviceId::from("D4");
    topo.instance.process_event(Event::DeviceDown(device_id));

    assert_eq!(topo.ports("D4"), None);
    assert_eq!(topo.role("D4"), None);
    assert_eq!(topo.ports("D1"), Some(btreeset! {10}));
    assert_eq!(topo.ports("D2"), Some(btreeset! {2}));
    assert_eq!(topo.role("D2"), Some(McastRole::Transit));
    assert_eq!(topo.ports("D3"), Some(btreeset! {5}));
    assert_eq!(topo.role("D1"), Some(McastRole::Ingress));
}

// Input:
//  * Source device D1 goes down
// Output:
//  * The whole tree is removed
#[test]
fn device_down_ingress() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.add_sink(&local_sink());

    topo.fabric.isolate("D1");
    let device_id = DeviceId::from("D1");
    topo.instance.process_event(Event::DeviceDown(device_id));

    assert!(topo.store.next_entries().is_empty());
    assert!(topo.store.role_entries().is_empty());
}

// Input:
//  * U is served through D5, which goes down and comes back
//  * U is connected again through D5
// Output:
//  * D5 gets its filter again
#[test]
fn device_down_filters_sent_again() {
    let topo = Topology::new();
    topo.fabric.disconnect(&cp("D1", 10), &cp("D2", 1));
    topo.add_sink(&sink_u());
    assert_eq!(topo.role("D5"), Some(McastRole::Transit));
    assert_eq!(topo.filtering_objectives("D5").len(), 1);

    topo.fabric.isolate("D5");
    let device_id = DeviceId::from("D5");
    topo.instance.process_event(Event::DeviceDown(device_id));
    assert_eq!(topo.ports("D4"), None);

    topo.fabric.connect(&cp("D1", 11), &cp("D5", 1));
    topo.fabric.connect(&cp("D4", 11), &cp("D5", 3));
    topo.fabric.take_objectives();
    topo.add_sink(&sink_u());

    assert_eq!(topo.ports("D5"), Some(btreeset! {3}));
    let filters = topo.filtering_objectives("D5");
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].port.0, 1);
}

// Input:
//  * Link D1-D2 goes down, U moves to D5
//  * Link D1-D2 comes back and link D1-D5 goes down
// Output:
//  * U moves back to D2, which gets its filter again
#[test]
fn link_down_filters_sent_again() {
    let topo = Topology::new();
    scenario_b(&topo);

    let link = topo.fabric.disconnect(&cp("D1", 10), &cp("D2", 1));
    topo.instance.process_event(Event::LinkDown(link));
    assert_eq!(topo.ports("D5"), Some(btreeset! {3}));

    topo.fabric.connect(&cp("D1", 10), &cp("D2", 1));
    topo.fabric.take_objectives();
    let link = topo.fabric.disconnect(&cp("D1", 11), &cp("D5", 1));
    topo.instance.process_event(Event::LinkDown(link));

    assert_eq!(topo.ports("D2"), Some(btreeset! {3}));
    assert_eq!(topo.role("D4"), Some(McastRole::Egress));
    let filters = topo.filtering_objectives("D2");
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].port.0, 1);
}

#[test]
fn device_down_not_leader() {
    let topo = Topology::new();
    scenario_b(&topo);
    topo.fabric.take_objectives();
    topo.fabric.set_leader(Some("node-2"));

    topo.fabric.isolate("D2");
    let device_id = DeviceId::from("D2");
    topo.instance.process_event(Event::DeviceDown(device_id));

    assert!(topo.fabric.objectives().is_empty());
    assert_eq!(topo.ports("D2"), Some(btreeset! {2, 3}));
}
