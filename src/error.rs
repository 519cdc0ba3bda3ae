use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not initialize logging")]
    Logging,
    #[display("could not open the index database")]
    Database,
    #[display("{_0} failed")]
    Command(#[error(not(source))] &'static str),
}
