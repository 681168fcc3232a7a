use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum Error {
    #[error("dimension must be greater than zero")]
    InvalidDimension,
    #[error("block size must be at least 2, found {found}")]
    InvalidBlockSize { found: usize },
    #[error("cannot build an index from an empty item sequence")]
    EmptyConstruction,
    #[error("slot cascade would exceed the maximum of 32 slots")]
    CapacityExceeded,
    #[error("insert attempted while an enumeration is in progress")]
    ConcurrentModification,
}
