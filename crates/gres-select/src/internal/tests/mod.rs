#[cfg(test)]
mod test_layout;

pub mod utils;
