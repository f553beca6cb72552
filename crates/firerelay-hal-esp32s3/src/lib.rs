//! ESP32-S3 adapters for the relay node core traits.

#![no_std]

extern crate alloc;

pub mod network;
pub mod relay;
pub mod storage;
