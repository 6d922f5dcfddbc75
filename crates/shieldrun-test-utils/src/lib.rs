pub mod harness;

pub use harness::{tempdir, SbatchCall, TestContext};
