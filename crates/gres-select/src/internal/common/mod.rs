pub(crate) mod bitmap;
pub(crate) mod error;
#[macro_use]
pub(crate) mod index;
