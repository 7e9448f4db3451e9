//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod config;
pub mod corrector;
pub mod debug;
pub mod error;
pub mod events;
pub mod fabric;
pub mod handler;
pub mod instance;
pub mod objective;
pub mod path;
pub mod service;
pub mod store;
pub mod task;
pub mod tasks;
pub mod tree;
