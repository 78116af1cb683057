#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use netmaster_core as core;
pub use netmaster_policy as policy;
pub use netmaster_state as state;

mod args;
mod controller;
mod engine;
mod log;

pub use self::{
    args::Args,
    controller::{load_intent, Controller},
    engine::LogRuleEngine,
    log::LogFormat,
};
