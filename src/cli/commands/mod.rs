//! CLI command implementations

pub mod checkout;
mod context;
pub mod install;
pub mod make_package_lock;
pub mod push;
pub mod remove;
pub mod status;
pub mod tree_hash;
pub mod verify;

pub use checkout::execute as checkout;
pub use context::CommandContext;
pub use install::execute as install;
pub use make_package_lock::execute as make_package_lock;
pub use push::execute as push;
pub use remove::execute as remove;
pub use status::execute as status;
pub use tree_hash::execute as tree_hash;
pub use verify::execute as verify;
