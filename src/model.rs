use core::fmt;
use std::process::{ExitCode, Termination};

use log::error;

use crate::filter_bank::ResampleError;

#[derive(Debug)]
pub enum MyError {
    Message(String),
}

impl fmt::Display for MyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MyError::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MyError {}

pub type MyResult<T> = Result<T, MyError>;

/// Exit-code wrapper: lets `main` return a result and still log the
/// failure through the normal logger before the process terminates.
pub struct TermResult(pub MyResult<()>);

impl Termination for TermResult {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{}", err);
                ExitCode::FAILURE
            }
        }
    }
}

impl From<Box<dyn std::error::Error>> for MyError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        MyError::Message(err.to_string())
    }
}

impl From<std::io::Error> for MyError {
    fn from(err: std::io::Error) -> Self {
        MyError::Message(err.to_string())
    }
}

impl From<ResampleError> for MyError {
    fn from(err: ResampleError) -> Self {
        MyError::Message(err.to_string())
    }
}

impl From<String> for MyError {
    fn from(msg: String) -> Self {
        MyError::Message(msg)
    }
}

impl From<&str> for MyError {
    fn from(msg: &str) -> Self {
        MyError::Message(msg.to_string())
    }
}
