#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use caretaker_core as core;
pub use caretaker_k8s_gateway as gateway;

mod args;
pub mod http;

pub use self::args::{Args, CredentialError};
