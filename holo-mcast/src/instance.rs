//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug_span;

use crate::config::McastCfg;
use crate::corrector;
use crate::debug::Debug;
use crate::events::{self, Event};
use crate::fabric::{ConnectPoint, DeviceId, PortNumber, VlanId};
use crate::handler::McastHandler;
use crate::service::{NodeId, Services};
use crate::store::{McastRole, McastRoleStoreKey, McastStore, McastStoreKey};
use crate::task::{IntervalTask, Task};
use crate::tasks;
use crate::tasks::messages::input::RetryMsg;
use crate::tree;

// Multicast instance of a controller node.
//
// All operations are serialized by a single instance-wide lock, held for
// their entire duration.
#[derive(Debug)]
pub struct Instance {
    handler: Mutex<McastHandler>,
}

// Background tasks of a running instance.
//
// Dropping this handle stops the tasks.
#[derive(Debug)]
pub struct InstanceTasks {
    pub event_tx: UnboundedSender<Event>,
    _main: Task<()>,
    _bucket_corrector: IntervalTask,
}

// ===== impl Instance =====

impl Instance {
    pub fn new(
        config: McastCfg,
        services: Services,
        store: McastStore,
    ) -> Arc<Instance> {
        let handler = McastHandler::new(config, services, store);
        Arc::new(Instance {
            handler: Mutex::new(handler),
        })
    }

    // Connects the pending sinks and spawns the background tasks.
    pub fn start(self: &Arc<Self>) -> InstanceTasks {
        Debug::InstanceStart.log();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        self.lock().retry_tx = Some(retry_tx);
        self.init();

        let main = tasks::main_loop(self.clone(), event_rx, retry_rx);
        let bucket_corrector = tasks::bucket_corrector(self.clone());
        InstanceTasks {
            event_tx,
            _main: main,
            _bucket_corrector: bucket_corrector,
        }
    }

    // Stops the background tasks and forgets the known group leaders.
    pub fn terminate(&self, tasks: InstanceTasks) {
        Debug::InstanceStop.log();
        drop(tasks);

        let mut mcast = self.lock();
        mcast.retry_tx = None;
        mcast.leaders.clear();
    }

    pub fn process_event(&self, event: Event) {
        let span = debug_span!("mcast", group = ?event.group());
        let _span_guard = span.enter();

        let mut mcast = self.lock();
        if let Err(error) = events::process_event(&mut mcast, event) {
            error.log();
        }
    }

    pub fn init(&self) {
        let span = debug_span!("mcast");
        let _span_guard = span.enter();

        let mut mcast = self.lock();
        events::init(&mut mcast);
    }

    pub fn update_filter(
        &self,
        device_id: &DeviceId,
        port: PortNumber,
        vlan: VlanId,
        install: bool,
    ) {
        let span = debug_span!("mcast", %device_id, %port);
        let _span_guard = span.enter();

        let mut mcast = self.lock();
        events::update_filter(&mut mcast, device_id, port, vlan, install);
    }

    pub fn run_bucket_corrector(&self) {
        let span = debug_span!("bucket-corrector");
        let _span_guard = span.enter();

        let mut mcast = self.lock();
        corrector::run(&mut mcast);
    }

    pub fn retry(&self, msg: RetryMsg) {
        let span = debug_span!("mcast", group = %msg.group);
        let _span_guard = span.enter();

        let mut mcast = self.lock();
        if let Err(error) =
            corrector::retry(&mut mcast, &msg.device_id, msg.group)
        {
            error.log();
        }
    }

    // ----- Diagnostics -----

    pub fn next_ids(
        &self,
        group: Option<IpAddr>,
    ) -> BTreeMap<McastStoreKey, u32> {
        tree::next_ids(&self.lock(), group)
    }

    pub fn roles(
        &self,
        group: Option<IpAddr>,
        source: Option<&ConnectPoint>,
    ) -> BTreeMap<McastRoleStoreKey, McastRole> {
        tree::roles(&self.lock(), group, source)
    }

    pub fn leaders(&self, group: Option<IpAddr>) -> BTreeMap<IpAddr, NodeId> {
        tree::leaders(&self.lock(), group)
    }

    pub fn paths(
        &self,
        group: IpAddr,
    ) -> BTreeMap<ConnectPoint, Vec<ConnectPoint>> {
        tree::paths(&self.lock(), group)
    }

    // Returns whether the forwarding state is eligible for correction.
    pub fn is_stable(&self) -> bool {
        self.lock().is_stable()
    }

    pub fn set_rng_seed(&self, seed: u64) {
        self.lock().set_rng_seed(seed);
    }

    // Returns the initial delay and period of the bucket corrector.
    pub(crate) fn verify_timers(&self) -> (Duration, Duration) {
        let mcast = self.lock();
        (
            mcast.config.verify_initial_delay(),
            mcast.config.verify_interval(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, McastHandler> {
        self.handler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
