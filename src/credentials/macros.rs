use super::{CredentialProvider, SourceInfo};
use crate::Result;

/// Internal registration structure used by the macro.
#[doc(hidden)]
pub struct CredentialSourceRegistration {
    pub info: SourceInfo,
    pub schemes: &'static [&'static str],
    pub factory: fn(&url::Url) -> Result<Box<dyn CredentialProvider>>,
}

/// Distributed slice that collects all credential source registrations.
#[doc(hidden)]
#[linkme::distributed_slice]
pub static CREDENTIAL_SOURCES: [CredentialSourceRegistration];

/// Registers a credential source under one or more URI schemes.
///
/// ```ignore
/// register_credential_source! {
///     struct: EnvCredentials,
///     config: EnvConfig,
///     name: "env",
///     description: "Process environment variables",
///     schemes: ["env"],
///     examples: ["env://"],
/// }
/// ```
#[doc(hidden)]
#[macro_export]
macro_rules! register_credential_source {
    (
        struct: $struct_name:ident,
        config: $config_type:ty,
        name: $name:expr,
        description: $description:expr,
        schemes: [$($scheme:expr),* $(,)?],
        examples: [$($example:expr),* $(,)?] $(,)?
    ) => {
        impl $struct_name {
            const SOURCE_NAME: &'static str = $name;
        }

        const _: () = {
            #[linkme::distributed_slice($crate::credentials::CREDENTIAL_SOURCES)]
            #[doc(hidden)]
            static SOURCE_REGISTRATION: $crate::credentials::CredentialSourceRegistration =
                $crate::credentials::CredentialSourceRegistration {
                    info: $crate::credentials::SourceInfo {
                        name: $name,
                        description: $description,
                        examples: &[$($example,)*],
                    },
                    schemes: &[$($scheme,)*],
                    factory: |url| {
                        let config = <$config_type>::try_from(url)?;
                        Ok(Box::new(<$struct_name>::new(config)))
                    },
                };
        };
    };
}
