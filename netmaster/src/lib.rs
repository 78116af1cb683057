//! A container network control plane.
//!
//! Given declarative tenant, network, endpoint group and policy intent, the
//! control plane allocates tags and addresses ([`resources`]), keeps network
//! state consistent in a key-value store ([`state`]) and compiles policies into
//! directional forwarding rules for the dataplane ([`policy`]).

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use netmaster_core as core;
pub use netmaster_policy as policy;
pub use netmaster_resources as resources;
pub use netmaster_runtime::{load_intent, Args, Controller, LogFormat, LogRuleEngine};
pub use netmaster_state as state;
