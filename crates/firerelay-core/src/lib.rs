//! Board-independent logic for the relay node: configuration, Wi-Fi
//! association policy, the remote database contract and the result
//! dispatcher that drives the relay output.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod node;
pub mod relay;
pub mod remote;
pub mod rtdb;
pub mod text;
pub mod wifi;
