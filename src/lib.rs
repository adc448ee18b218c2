pub mod context;
pub mod deleter;
pub mod error;
pub mod fsops;
pub mod safety;
pub mod task;
pub mod token;

pub use deleter::{delete_directory_recursive, Deleter, DeleterConfig, DeletionReport};
