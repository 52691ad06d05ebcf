//! Unit tests driving the harness against in-memory fakes

mod fakes;
mod test_migration;
mod test_provision;
