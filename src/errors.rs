use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

// ResultBoxedError returns a result of a given type or a boxed error, in order
// to encapsulate the different error kinds below without an explicit
// conversion at each call site.
pub type ResultBoxedError<T> = Result<T, Box<dyn std::error::Error>>;

// ErrorInvalidArgument is returned when a caller-supplied value is out of
// range or a message does not have the expected shape.
#[derive(Debug)]
pub struct ErrorInvalidArgument {
  details: String,
}

impl ErrorInvalidArgument {
  pub fn new(details: &str) -> Self {
    Self {
      details: details.to_string(),
    }
  }
}

impl Display for ErrorInvalidArgument {
  fn fmt(&self, f: &mut Formatter) -> FmtResult {
    write!(f, "Invalid argument: {}", self.details)
  }
}

impl Error for ErrorInvalidArgument {}

// ErrorPreconditionFailed is returned when an operation is attempted before
// the state it depends on exists, e.g. querying a server that has not been
// preprocessed.
#[derive(Debug)]
pub struct ErrorPreconditionFailed {
  details: String,
}

impl ErrorPreconditionFailed {
  pub fn new(details: &str) -> Self {
    Self {
      details: details.to_string(),
    }
  }
}

impl Display for ErrorPreconditionFailed {
  fn fmt(&self, f: &mut Formatter) -> FmtResult {
    write!(f, "Precondition failed: {}", self.details)
  }
}

impl Error for ErrorPreconditionFailed {}

// ErrorInternalArithmetic covers modulus and transform construction failures.
// These cannot occur under valid parameters.
#[derive(Debug)]
pub struct ErrorInternalArithmetic {
  details: String,
}

impl ErrorInternalArithmetic {
  pub fn new(details: &str) -> Self {
    Self {
      details: details.to_string(),
    }
  }
}

impl Display for ErrorInternalArithmetic {
  fn fmt(&self, f: &mut Formatter) -> FmtResult {
    write!(f, "Internal arithmetic error: {}", self.details)
  }
}

impl Error for ErrorInternalArithmetic {}
