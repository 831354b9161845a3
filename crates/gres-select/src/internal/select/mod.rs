pub mod assign;
pub mod dispatch;
pub mod filter;
pub mod layout;
pub mod shared;
pub mod snapshot;
pub mod topo;
