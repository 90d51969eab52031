//! Operation and result types shared by the stream engine and stores.

mod entry;
mod operation;

pub use entry::{ContinuationToken, Entry, Page, WriteReceipt};
pub use operation::{
    ListOperation, LoadOperation, Operation, OperationId, WriteMode, WriteOperation,
};
