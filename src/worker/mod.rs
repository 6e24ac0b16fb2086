pub mod task;
pub(crate) mod worker;
