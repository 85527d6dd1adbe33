use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("zone must be at least {min}x{min}, got {height}x{width}")]
    ZoneTooSmall {
        height: usize,
        width: usize,
        min: usize,
    },
}
