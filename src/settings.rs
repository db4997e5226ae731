use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub secret: String,
    pub access_token_exp_sec: i64,
    pub confirmation_code_ttl_min: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailSettings {
    pub from: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuperuserSettings {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub mail: MailSettings,
    pub superuser: Option<SuperuserSettings>,
}

impl Settings {
    /// Loads `config/default.*` (optional) and `APP__SECTION__KEY` environment
    /// variables on top of the built-in defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.pool_size", 10)?
            .set_default("auth.access_token_exp_sec", 86_400)?
            .set_default("auth.confirmation_code_ttl_min", 1_440)?
            .set_default("mail.from", "noreply@reviews.local")?
            .set_default("mail.smtp_port", 587)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything_but_secrets() {
        let builder = Settings::defaults()
            .unwrap()
            .set_override("database.url", "postgres://localhost/reviews")
            .unwrap()
            .set_override("auth.secret", "s3cr3t")
            .unwrap();
        let settings = Settings::from_builder(builder).unwrap();

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.database.pool_size, 10);
        assert_eq!(settings.auth.access_token_exp_sec, 86_400);
        assert_eq!(settings.auth.confirmation_code_ttl_min, 1_440);
        assert!(settings.mail.smtp_host.is_none());
        assert!(settings.superuser.is_none());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let builder = Settings::defaults()
            .unwrap()
            .set_override("database.url", "postgres://localhost/reviews")
            .unwrap();
        assert!(Settings::from_builder(builder).is_err());
    }

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let builder = Settings::defaults()
            .unwrap()
            .set_override("database.url", "postgres://db/reviews")
            .unwrap()
            .set_override("auth.secret", "s3cr3t")
            .unwrap()
            .set_override("server.port", 9000)
            .unwrap()
            .set_override("superuser.username", "root")
            .unwrap()
            .set_override("superuser.email", "root@example.com")
            .unwrap();
        let settings = Settings::from_builder(builder).unwrap();

        assert_eq!(settings.server.port, 9000);
        let superuser = settings.superuser.unwrap();
        assert_eq!(superuser.username, "root");
        assert_eq!(superuser.email, "root@example.com");
    }
}
