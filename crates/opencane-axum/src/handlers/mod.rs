//! Per-resource HTTP handlers for the control surface (spec §6.2). Each
//! submodule covers one resource group named in the endpoint list.

pub mod device;
pub mod digital_task;
pub mod lifelog;
pub mod runtime;
pub mod ws;
