//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_mcast::config::McastCfg;
use holo_mcast::fabric::{MacAddr, VlanId};
use holo_mcast::objective::EtherType;
use maplit::btreeset;

use crate::topology::*;

#[test]
fn untagged_egress() {
    let topo = Topology::new();
    topo.add_sink(&sink_t());

    for device_id in ["D1", "D2", "D3"] {
        let nexts = topo.next_objectives(device_id);
        assert!(nexts[0].pop_vlan);
        let fwds = topo.forwarding_objectives(device_id);
        assert_eq!(fwds[0].ether_type, EtherType::Ipv4);
        assert_eq!(fwds[0].priority, McastCfg::DFLT_PRIORITY);
    }
    assert_eq!(topo.next_objectives("D1")[0].vlan, SOURCE_VLAN);
    assert_eq!(topo.next_objectives("D3")[0].vlan, FABRIC_VLAN);
}

// Input:
//  * Egress VLAN configured
// Output:
//  * The egress VLAN is used on every device, the source one included
#[test]
fn tagged_egress() {
    let vlan = VlanId(100);
    let topo = Topology::with_config(McastCfg {
        egress_vlan: Some(vlan),
        ingress_vlan: Some(VlanId(200)),
        ..config()
    });
    topo.add_sink(&sink_t());

    assert_eq!(topo.ports_with_vlan("D1", vlan), Some(btreeset! {10}));
    assert_eq!(topo.ports_with_vlan("D2", vlan), Some(btreeset! {2}));
    assert_eq!(topo.ports_with_vlan("D3", vlan), Some(btreeset! {5}));
    assert!(!topo.next_objectives("D3")[0].pop_vlan);

    // Source port admits the ingress VLAN, fabric ports the egress one.
    let filter = &topo.filtering_objectives("D1")[0];
    assert_eq!(filter.vlan_match, VlanId(200));
    assert_eq!(filter.assigned_vlan, vlan);
    let filter = &topo.filtering_objectives("D2")[0];
    assert_eq!(filter.vlan_match, vlan);
    assert_eq!(filter.assigned_vlan, vlan);
}

#[test]
fn match_on_mac() {
    let topo = Topology::with_config(McastCfg {
        match_on_mac: true,
        ..config()
    });
    topo.add_sink(&sink_t());

    let filter = &topo.filtering_objectives("D1")[0];
    assert_eq!(
        filter.eth_dst_masked,
        Some((MacAddr::IPV4_MULTICAST, MacAddr::IPV4_MULTICAST_MASK))
    );
    assert_eq!(filter.router_mac, Some(MacAddr([0x02, 0, 0, 0, 0, 1])));

    let topo = Topology::new();
    topo.add_sink(&sink_t());
    let filter = &topo.filtering_objectives("D1")[0];
    assert_eq!(filter.eth_dst_masked, None);
    assert_eq!(filter.router_mac, None);
}

// Input:
//  * Sink T added while D3 lacks configuration
// Output:
//  * D3 is programmed but no filter is installed on it
#[test]
fn filter_unconfigured_device() {
    let topo = Topology::new();
    topo.fabric.unconfigure("D3");
    topo.add_sink(&sink_t());

    assert_eq!(topo.ports("D3"), Some(btreeset! {5}));
    assert!(topo.filtering_objectives("D3").is_empty());
    assert_eq!(topo.filtering_objectives("D2").len(), 1);
}

#[test]
fn filter_missing_router_mac() {
    let topo = Topology::new();
    topo.fabric.add_leaf("D3", MacAddr::NONE);
    topo.add_sink(&sink_t());

    assert_eq!(topo.ports("D3"), Some(btreeset! {5}));
    assert!(topo.filtering_objectives("D3").is_empty());
}
