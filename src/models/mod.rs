//! Model provider configuration and model catalogs.

mod error;
mod registry;
mod types;

pub use error::RegistryError;
pub use registry::ModelRegistry;
pub use types::{
    CredentialSource, EnabledModel, ModelInfo, ModelProviderConfig, ModelProvidersData,
    SaveProviderRequest, TokenValidation, ValidationFailure,
};
