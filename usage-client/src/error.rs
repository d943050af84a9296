/// Failure of a single usage fetch.
///
/// `Clone` so a coalesced fetch can hand the same outcome to every waiter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}
