use std::any::Any;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DumpScanError {
    #[error("could not spawn recorder thread")]
    RecorderSpawn(#[from] std::io::Error),
    #[error("recorder thread panicked")]
    RecorderThreadError { e: Box<dyn Any + Send + 'static> },
}
