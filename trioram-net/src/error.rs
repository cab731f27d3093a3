use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bearer I/O error")]
    BearerIo(#[from] tokio::io::Error),

    #[error("short read: wanted {wanted} bytes, stream ended")]
    ShortRead { wanted: usize },

    #[error("no {0} stream on this party")]
    NoStream(&'static str),

    #[error("preprocessing record store exhausted: {prefix}")]
    PrecompExhausted { prefix: String },

    #[error("preprocessing record size mismatch in {prefix}: {got} % {record} != 0")]
    PrecompSize {
        prefix: String,
        got: u64,
        record: usize,
    },

    #[error("unexpected preprocessing frame type {0:#04x}")]
    BadFrame(u8),

    #[error("lamport clocks disagree: ours {ours}, theirs {theirs}")]
    LamportSkew { ours: u64, theirs: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
