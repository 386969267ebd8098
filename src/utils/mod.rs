//! Small building blocks shared by the reactor and the channels.

pub mod heap;
pub(crate) mod sys;
