pub mod deadlines;

pub use deadlines::DeadlineQueue;
