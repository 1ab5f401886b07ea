//! CLI command implementations. Each command returns a serializable
//! `serde_json::Value` payload; the binary decides how to render it.

mod maintain_cmd;
mod record_cmd;
mod report_cmd;
mod trend_cmd;

pub use maintain_cmd::*;
pub use record_cmd::*;
pub use report_cmd::*;
pub use trend_cmd::*;

use crate::{Config, ProfileDb, ReqprofResult};

pub(crate) fn open_db(config: &Config) -> ReqprofResult<ProfileDb> {
    let offset = config.reference_offset()?;
    ProfileDb::open_at(config.db_path(), offset)
}
