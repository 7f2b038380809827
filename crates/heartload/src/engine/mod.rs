pub mod admission;
pub mod classify;
pub mod deadline;
pub mod dialer;
pub mod listener;
pub mod supervisor;
