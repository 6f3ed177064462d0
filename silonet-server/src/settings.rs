//! Settings loading and validation.
//!
//! Settings are read from a TOML file, and any value can be overridden through a
//! `SILONET_` prefixed environment variable. A commented example file lives in the
//! `configs/` directory at the repository root.

#[cfg(feature = "tls")]
use std::path::PathBuf;
use std::{fmt, path::Path};

use config::{Config, ConfigError, Environment};
use redis::{ConnectionInfo, IntoConnectionInfo};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use silonet_core::{
    model::RETRAIN_EPOCHS,
    validation::{
        EncryptionMethod,
        PrivacyLevel,
        PrivacySettings as PrivacyConfig,
        PsiProtocol,
        SmpcProtocol,
    },
};

#[derive(Error, Debug)]
/// Failure to assemble a valid configuration.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// All coordinator settings, one field per configuration file section.
pub struct Settings {
    #[cfg_attr(feature = "tls", validate)]
    pub api: ApiSettings,
    #[validate]
    pub pipeline: PipelineSettings,
    #[validate]
    pub privacy: PrivacySettings,
    #[validate]
    pub trainer: TrainerSettings,
    pub log: LoggingSettings,
    #[validate]
    pub metrics: MetricsSettings,
    pub redis: RedisSettings,
}

impl Settings {
    /// Reads the settings from the given file and validates them.
    ///
    /// # Errors
    /// Fails if the file cannot be read or a value is out of range.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(config::File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("silonet").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
/// Round pipeline settings.
pub struct PipelineSettings {
    #[validate(range(min = 2))]
    /// The maximal number of parties whose datasets are staged for a single round. One share of
    /// the cipher capacity is always reserved for the noise ciphertext, so the value must be
    /// greater or equal to `2` (i.e. `capacity >= 2`).
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [pipeline]
    /// capacity = 10
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_PIPELINE__CAPACITY=10
    /// ```
    pub capacity: usize,

    #[validate(range(min = 1))]
    /// The amount of time the coordinator waits for a trained model before it abandons the round,
    /// in seconds.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [pipeline]
    /// timeout = 60
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_PIPELINE__TIMEOUT=60
    /// ```
    pub timeout: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            capacity: 10_usize,
            timeout: 60_u64,
        }
    }
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
#[validate(schema(function = "validate_privacy"))]
/// Privacy settings.
///
/// The four protocol fields name the one combination this coordinator runs. Uploads that claim
/// any other setting are rejected wholesale during validation.
pub struct PrivacySettings {
    /// The differential privacy level under which rounds are run.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [privacy]
    /// level = "Medium"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_PRIVACY__LEVEL=Medium
    /// ```
    pub level: PrivacyLevel,

    /// The encryption method under which datasets are staged and aggregated.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [privacy]
    /// encryption = "PHE"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_PRIVACY__ENCRYPTION=PHE
    /// ```
    pub encryption: EncryptionMethod,

    /// The secure multi-party computation protocol under which datasets are aggregated.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [privacy]
    /// smpc = "Cheetah"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_PRIVACY__SMPC=Cheetah
    /// ```
    pub smpc: SmpcProtocol,

    /// The private set intersection protocol under which datasets are aligned.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [privacy]
    /// psi = "ECDH-PSI"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_PRIVACY__PSI=ECDH-PSI
    /// ```
    pub psi: PsiProtocol,

    /// The privacy budget of a round, used when neither the uploads nor the start request carry
    /// an epsilon. The value must be positive and finite.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [privacy]
    /// default_epsilon = 1.0
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_PRIVACY__DEFAULT_EPSILON=1.0
    /// ```
    pub default_epsilon: f64,

    /// The L1 sensitivity to which the Laplace noise is calibrated. The value must be positive
    /// and finite.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [privacy]
    /// sensitivity = 1.0
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_PRIVACY__SENSITIVITY=1.0
    /// ```
    pub sensitivity: f64,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            level: PrivacyLevel::Medium,
            encryption: EncryptionMethod::Phe,
            smpc: SmpcProtocol::Cheetah,
            psi: PsiProtocol::EcdhPsi,
            default_epsilon: 1.0_f64,
            sensitivity: 1.0_f64,
        }
    }
}

/// Checks privacy settings.
fn validate_privacy(s: &PrivacySettings) -> Result<(), ValidationError> {
    validate_epsilon(s)?;
    validate_sensitivity(s)
}

/// Checks validity of the privacy budget.
fn validate_epsilon(s: &PrivacySettings) -> Result<(), ValidationError> {
    if s.default_epsilon.is_finite() && s.default_epsilon > 0. {
        Ok(())
    } else {
        Err(ValidationError::new("invalid privacy budget"))
    }
}

/// Checks validity of the noise sensitivity.
fn validate_sensitivity(s: &PrivacySettings) -> Result<(), ValidationError> {
    if s.sensitivity.is_finite() && s.sensitivity > 0. {
        Ok(())
    } else {
        Err(ValidationError::new("invalid sensitivity"))
    }
}

impl From<PrivacySettings> for PrivacyConfig {
    fn from(
        PrivacySettings {
            level,
            encryption,
            smpc,
            psi,
            ..
        }: PrivacySettings,
    ) -> PrivacyConfig {
        PrivacyConfig {
            level,
            encryption,
            smpc,
            psi,
        }
    }
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
/// Trainer settings.
pub struct TrainerSettings {
    #[validate(range(min = 1))]
    /// The number of epochs a model is retrained for after an incremental or decremental update.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [trainer]
    /// epochs = 5
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_TRAINER__EPOCHS=5
    /// ```
    pub epochs: usize,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            epochs: RETRAIN_EPOCHS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[cfg_attr(
    feature = "tls",
    derive(Validate),
    validate(schema(function = "validate_api"))
)]
/// REST API settings.
///
/// With the `tls` feature enabled, at least one of the following must be configured:
/// - `tls_certificate` and `tls_key` for TLS server authentication
/// - `tls_client_auth` for TLS client authentication
pub struct ApiSettings {
    /// The socket address the REST API listens on.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// bind_address = "127.0.0.1:8081"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_API__BIND_ADDRESS=127.0.0.1:8081
    /// ```
    pub bind_address: std::net::SocketAddr,

    #[cfg(feature = "tls")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tls")))]
    /// Path of the certificate the server presents. Enables TLS server authentication,
    /// `tls_key` must be set as well for it to take effect.
    ///
    /// Only available with the `tls` feature.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// tls_certificate = path/to/tls/files/cert.pem
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_API__TLS_CERTIFICATE=path/to/tls/files/certificate.pem
    /// ```
    pub tls_certificate: Option<PathBuf>,

    #[cfg(feature = "tls")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tls")))]
    /// Path of the server private key. Enables TLS server authentication,
    /// `tls_certificate` must be set as well for it to take effect.
    ///
    /// Only available with the `tls` feature.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// tls_key = path/to/tls/files/key.rsa
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_API__TLS_KEY=path/to/tls/files/key.rsa
    /// ```
    pub tls_key: Option<PathBuf>,

    #[cfg(feature = "tls")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tls")))]
    /// Path of the trust anchor against which client certificates are verified.
    /// Enables TLS client authentication.
    ///
    /// Only available with the `tls` feature.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// tls_client_auth = path/to/tls/files/trust_anchor.pem
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_API__TLS_CLIENT_AUTH=path/to/tls/files/trust_anchor.pem
    /// ```
    pub(crate) tls_client_auth: Option<PathBuf>,
}

#[cfg(feature = "tls")]
impl ApiSettings {
    /// Checks that the configured TLS paths form a usable combination.
    fn validate_api(&self) -> Result<(), ValidationError> {
        match (&self.tls_certificate, &self.tls_key, &self.tls_client_auth) {
            (Some(_), Some(_), _) | (None, None, Some(_)) => Ok(()),
            _ => Err(ValidationError::new("invalid tls settings")),
        }
    }
}

/// Hook for the schema validation on [`ApiSettings`].
#[cfg(feature = "tls")]
fn validate_api(s: &ApiSettings) -> Result<(), ValidationError> {
    s.validate_api()
}

#[derive(Debug, Deserialize, Validate)]
/// Metrics sink settings.
pub struct MetricsSettings {
    #[validate]
    /// Settings for the InfluxDB sink.
    pub influxdb: InfluxSettings,
}

#[derive(Debug, Deserialize, Validate)]
/// Settings for the InfluxDB sink.
pub struct InfluxSettings {
    #[validate(url)]
    /// The URL of the InfluxDB instance.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [metrics.influxdb]
    /// url = "http://127.0.0.1:8086"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_METRICS__INFLUXDB__URL=http://127.0.0.1:8086
    /// ```
    pub url: String,

    /// The database the data points are written into.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [metrics.influxdb]
    /// db = "metrics"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_METRICS__INFLUXDB__DB=metrics
    /// ```
    pub db: String,
}

#[derive(Debug, Deserialize)]
/// Settings for the Redis backend.
pub struct RedisSettings {
    /// The Redis connection URL, in the form
    /// `redis://[<username>][:<passwd>@]<hostname>[:port][/<db>]`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [redis]
    /// url = "redis://127.0.0.1/"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_REDIS__URL=redis://127.0.0.1/
    /// ```
    #[serde(deserialize_with = "deserialize_redis_url")]
    pub url: ConnectionInfo,
}

fn deserialize_redis_url<'de, D>(deserializer: D) -> Result<ConnectionInfo, D::Error>
where
    D: Deserializer<'de>,
{
    struct ConnectionInfoVisitor;

    impl<'de> Visitor<'de> for ConnectionInfoVisitor {
        type Value = ConnectionInfo;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(
                formatter,
                "redis://[<username>][:<passwd>@]<hostname>[:port][/<db>]"
            )
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            value
                .into_connection_info()
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(ConnectionInfoVisitor)
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// Tracing filter directives, comma separated. The directive syntax is
    /// described in the [tracing-subscriber documentation][directives].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "silonet=debug,info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// SILONET_LOG__FILTER=silonet=debug,info
    /// ```
    ///
    /// [directives]: https://docs.rs/tracing-subscriber/0.2.6/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.2.6/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[cfg(not(feature = "tls"))]
    #[test]
    #[serial]
    fn test_settings_new() {
        assert!(Settings::new("../configs/config.toml").is_ok());
        assert!(Settings::new("").is_err());
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    #[serial]
    fn test_env_overrides_the_file() {
        std::env::set_var("SILONET_PIPELINE__CAPACITY", "4");
        let settings = Settings::new("../configs/config.toml");
        std::env::remove_var("SILONET_PIPELINE__CAPACITY");
        assert_eq!(settings.unwrap().pipeline.capacity, 4);
    }

    #[test]
    fn test_validate_pipeline() {
        assert!(PipelineSettings::default().validate().is_ok());

        // a capacity of 1 would leave no share for the noise ciphertext
        assert!(PipelineSettings {
            capacity: 1,
            ..PipelineSettings::default()
        }
        .validate()
        .is_err());
        assert!(PipelineSettings {
            timeout: 0,
            ..PipelineSettings::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_validate_privacy() {
        assert!(validate_privacy(&PrivacySettings::default()).is_ok());

        // privacy budget
        assert!(validate_privacy(&PrivacySettings {
            default_epsilon: 0.,
            ..PrivacySettings::default()
        })
        .is_err());
        assert!(validate_privacy(&PrivacySettings {
            default_epsilon: -1.,
            ..PrivacySettings::default()
        })
        .is_err());
        assert!(validate_privacy(&PrivacySettings {
            default_epsilon: f64::NAN,
            ..PrivacySettings::default()
        })
        .is_err());
        assert!(validate_privacy(&PrivacySettings {
            default_epsilon: f64::INFINITY,
            ..PrivacySettings::default()
        })
        .is_err());

        // sensitivity
        assert!(validate_privacy(&PrivacySettings {
            sensitivity: 0.,
            ..PrivacySettings::default()
        })
        .is_err());
        assert!(validate_privacy(&PrivacySettings {
            sensitivity: f64::NAN,
            ..PrivacySettings::default()
        })
        .is_err());
    }

    #[test]
    fn test_validate_trainer() {
        assert!(TrainerSettings::default().validate().is_ok());
        assert!(TrainerSettings { epochs: 0 }.validate().is_err());
    }

    #[test]
    fn test_privacy_protocols_are_closed_sets() {
        let mut config = Config::new();
        // safe unwrap: the string literal is valid TOML
        config
            .merge(config::File::from_str(
                r#"
                level = "Medium"
                encryption = "PHE"
                smpc = "Shamir"
                psi = "ECDH-PSI"
                default_epsilon = 1.0
                sensitivity = 1.0
                "#,
                config::FileFormat::Toml,
            ))
            .unwrap();
        assert!(config.try_into::<PrivacySettings>().is_err());

        let mut config = Config::new();
        // safe unwrap: the string literal is valid TOML
        config
            .merge(config::File::from_str(
                r#"
                level = "Medium"
                encryption = "PHE"
                smpc = "Cheetah"
                psi = "ECDH-PSI"
                default_epsilon = 1.0
                sensitivity = 1.0
                "#,
                config::FileFormat::Toml,
            ))
            .unwrap();
        assert!(config.try_into::<PrivacySettings>().is_ok());
    }
}
