#[macro_use]
pub(crate) mod common;
pub mod gres;
pub mod select;

#[cfg(test)]
mod tests;
