mod add;
mod clean;
mod compare;
mod diff;
mod list;
mod remove;
pub mod server;

pub use add::*;
pub use clean::*;
pub use compare::*;
pub use diff::*;
pub use list::*;
pub use remove::*;
pub use server::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
