use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("configuration number {incoming} does not advance past current {current}")]
    StaleConfiguration { incoming: u32, current: u32 },
    #[error("configuration undersized: N={n} must be >= 3f+2k+1 = {required}")]
    Undersized { n: u32, required: u32 },
}

pub type Result<T> = std::result::Result<T, ClusterError>;
