//! Unit tests exercising cross-module behavior not already covered by the
//! inline `#[cfg(test)]` modules next to each implementation.

mod test_config;
mod test_store;
