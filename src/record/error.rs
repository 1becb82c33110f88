use std::{io, result};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Record serialization error: {0}")]
    Csv(#[from] csv::Error),
}

pub(crate) type Result<T> = result::Result<T, RecordError>;
