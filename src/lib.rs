//! Reqprof core library: month-bucketed request profiling aggregates and
//! reports over a SQLite sample store.

mod cmd;
mod config;
mod error;
mod histogram;
mod monthstamp;
mod page_groups;
mod purge;
mod query;
mod store;

pub use cmd::*;
pub use config::*;
pub use error::*;
pub use histogram::*;
pub use monthstamp::*;
pub use page_groups::*;
pub use query::*;
pub use store::*;
