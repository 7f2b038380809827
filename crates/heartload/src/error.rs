use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("accept tcp: {0}")]
    Accept(#[source] io::Error),

    #[error("dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("ping: {0}")]
    Ping(#[source] io::Error),

    #[error("handle conn: {0}")]
    Exchange(#[source] io::Error),

    #[error("peer closed the connection")]
    PeerClosed,
}

pub type Result<T> = std::result::Result<T, SimError>;
