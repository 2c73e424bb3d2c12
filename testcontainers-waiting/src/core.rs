pub use self::{
    target::{ExecResult, WaitTarget},
    wait::{StrategyKind, WaitAllMode, WaitFor, WaitStrategy},
};

pub mod error;
pub mod target;
pub mod wait;

pub(crate) mod env;
