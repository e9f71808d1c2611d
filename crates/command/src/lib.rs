//! World management commands.
//!
//! Each command declares the permission node it needs and a usage line;
//! [`CommandSet::dispatch`] checks both before calling into the
//! [`WorldManager`](multiworld_kernel::WorldManager). Results are message
//! keys plus arguments so the host can localize them.

mod command;
mod commands;
mod perm;

pub use command::{Command, CommandError, CommandSet, Outcome};
pub use commands::{
    Blacklist, Create, Delete, Exception, Import, Info, List, Load, Modify, Remove, Unload,
};
pub use perm::{AllowAll, GrantList, Perm, PermissionChecker};
