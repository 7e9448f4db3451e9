//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{Instrument, debug_span};

use crate::events::Event;
use crate::instance::Instance;
use crate::task::{IntervalTask, Task};

//
// Multicast tasks diagram:
//                                +--------------+
//                                | event source |
//                                +--------------+
//                                       |
//                                       | (1x) event_rx
//                                       V
//                                +--------------+
//        bucket_corrector (1x) ->|   instance   |<- (1x) retry_rx
//                                +--------------+
//                                       |
//                                       | objectives
//                                       V
//                                +--------------+
//                                |  flow objs   |-> (Nx) retry_tx
//                                +--------------+
//

// Multicast inter-task message types.
pub mod messages {
    use serde::{Deserialize, Serialize};

    // Input messages (child task -> main task).
    pub mod input {
        use std::net::IpAddr;

        use super::*;
        use crate::fabric::DeviceId;

        #[derive(Clone, Debug, Eq, PartialEq)]
        #[derive(Deserialize, Serialize)]
        pub struct RetryMsg {
            pub device_id: DeviceId,
            pub group: IpAddr,
        }
    }
}

// ===== multicast tasks =====

// Main task processing events and retry requests in arrival order.
pub(crate) fn main_loop(
    instance: Arc<Instance>,
    mut event_rx: UnboundedReceiver<Event>,
    mut retry_rx: UnboundedReceiver<messages::input::RetryMsg>,
) -> Task<()> {
    Task::spawn(
        async move {
            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        let Some(event) = event else {
                            break;
                        };
                        instance.process_event(event);
                    }
                    Some(msg) = retry_rx.recv() => {
                        instance.retry(msg);
                    }
                }
            }
        }
        .instrument(debug_span!("mcast")),
    )
}

// Periodic bucket corrector.
pub(crate) fn bucket_corrector(instance: Arc<Instance>) -> IntervalTask {
    let (initial_delay, interval) = instance.verify_timers();
    IntervalTask::new(initial_delay, interval, move || {
        let instance = instance.clone();
        async move {
            instance.run_bucket_corrector();
        }
        .instrument(debug_span!("mcast"))
    })
}
