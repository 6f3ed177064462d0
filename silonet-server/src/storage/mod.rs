mod store;
mod traits;

pub mod memory;
pub mod redis;

pub use self::{
    store::Store,
    traits::{
        CheckpointStorage,
        DatasetAdd,
        DatasetAddError,
        ProjectStorage,
        StagedDataset,
        Storage,
        StorageError,
        StorageResult,
    },
};

#[cfg(test)]
pub(crate) mod tests;
