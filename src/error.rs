//! Error types for map operations

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ListMapError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("key not found")]
    KeyNotFound,

    #[error("key already present")]
    KeyExists,

    #[error("failed to grow backing file: {0}")]
    GrowthFailed(#[source] io::Error),

    #[error("key length {0} exceeds the record length field")]
    KeyTooLarge(usize),

    #[error("value length {0} exceeds the record length field")]
    ValueTooLarge(usize),

    #[error("map file is corrupt: {0}")]
    Corrupt(String),

    #[error("record chain is corrupt: {0}")]
    CorruptChain(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ListMapError>;
