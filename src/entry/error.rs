use std::{io, result};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Failed to bind entry socket: {0}")]
    Bind(io::Error),
}

pub(super) type Result<T> = result::Result<T, EntryError>;
