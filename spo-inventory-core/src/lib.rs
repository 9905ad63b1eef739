#![doc = "spo-inventory-core: core logic library for spo-inventory."]

//! This crate holds the data model, the output sink and the inventory pipeline.
//! Network access lives behind the [`contract`] traits; the CLI crate provides the
//! REST implementation and tests use the generated mocks.

pub mod config;
pub mod contract;
pub mod inventory;
pub mod records;
pub mod sink;
pub mod timestamp;
