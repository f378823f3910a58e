mod bootstrap;
mod runner;

pub(crate) use bootstrap::{build_app, init_tracing};
pub(crate) use runner::run;
