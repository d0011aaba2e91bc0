pub mod schema;
pub mod store;

pub use store::{FeedbackJob, Store};
