mod task_runner;

pub use task_runner::{Task, TaskRunner};
