pub mod filter;
pub mod select;
