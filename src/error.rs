use thiserror::Error;

use crate::component::ComponentError;
use crate::expr::EvalError;
use crate::registry::RegistryError;
use crate::render::RenderError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),
    // registration-time misconfiguration
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
