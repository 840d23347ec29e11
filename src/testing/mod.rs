//! Testing infrastructure: mock implementations of the loop's collaborator
//! traits.
//!
//! These enable unit testing the iteration controller without real agent
//! subprocesses, check scripts, git repositories, or ledger files.

mod mocks;

pub use mocks::{MockAgent, MockCommitter, MockGate, MockTaskStore, SharedPrd};
