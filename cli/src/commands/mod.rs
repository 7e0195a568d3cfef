mod account;
mod helpers;
mod progress;
mod seed;

pub(crate) use account::{RegisterArgs, cmd_register};
pub(crate) use progress::{cmd_check, cmd_month, cmd_summary, cmd_trend};
pub(crate) use seed::cmd_seed;
