//! Configuration Management
//!
//! Values are read, in increasing priority, from `<config dir>/sdrflow/config.toml`, from
//! `config.toml` in the working directory, and from `SDRFLOW_*` environment variables.
//! Keys that the runtime does not know are kept and can be queried with [`Config::get`].
use config::builder::DefaultState;
use config::ConfigBuilder;
use config::File;
use config::FileFormat;
use config::Source;
use config::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Queue size of block inboxes
    pub queue_size: usize,
    /// Default stream buffer size in bytes
    pub buffer_size: usize,
    /// Stack size of partition threads
    pub stack_size: usize,
    /// Log level
    pub log_level: LevelFilter,
    /// Longest time an idle partition sleeps before it checks its blocks again
    pub idle_timeout: Duration,
    misc: HashMap<String, Value>,
}

impl Config {
    /// Load the configuration from files and environment.
    ///
    /// Invalid values are logged and leave the default in place.
    pub fn load() -> Config {
        let mut settings = ::config::Config::builder();

        // user config
        if let Some(mut path) = dirs::config_dir() {
            path.push("sdrflow");
            path.push("config.toml");
            settings = settings.add_source(File::from(path).required(false));
        }

        // project config
        settings = settings.add_source(File::new("config.toml", FileFormat::Toml).required(false));

        // env config
        settings = settings.add_source(config::Environment::with_prefix("sdrflow"));

        Config::from_builder(settings)
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(toml: &str) -> Config {
        Config::from_builder(
            ::config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    fn from_builder(settings: ConfigBuilder<DefaultState>) -> Config {
        // start from default config
        let mut c = Config::default();

        match settings.build() {
            Ok(settings) => match settings.collect() {
                Ok(config) => {
                    for (k, v) in config.into_iter() {
                        c.set_value(k, v);
                    }
                }
                Err(e) => warn!("error parsing config {e:?}"),
            },
            Err(e) => warn!("error reading config {e:?}"),
        }
        c
    }

    /// Set a value. Known keys update the typed fields.
    pub fn set<V: Into<Value>>(&mut self, name: impl Into<String>, value: V) {
        self.set_value(name, value);
    }

    /// Raw value of an unknown key.
    pub fn get_value(&self, name: &str) -> Option<Value> {
        self.misc.get(name).cloned()
    }

    /// Try to parse the value of an unknown key.
    pub fn get<T: FromStr>(&self, name: &str) -> Option<T> {
        self.misc
            .get(name)
            .and_then(|v| v.clone().into_string().ok())
            .and_then(|v| v.parse::<T>().ok())
    }

    fn set_value<V: Into<Value>>(&mut self, name: impl Into<String>, value: V) {
        let name = name.into();
        let value = value.into();

        match name.as_str() {
            "queue_size" => config_parse(&name, &value, &mut self.queue_size),
            "buffer_size" => config_parse(&name, &value, &mut self.buffer_size),
            "stack_size" => config_parse(&name, &value, &mut self.stack_size),
            "log_level" => config_parse(&name, &value, &mut self.log_level),
            "idle_timeout_us" => {
                let mut us = self.idle_timeout.as_micros() as u64;
                config_parse(&name, &value, &mut us);
                self.idle_timeout = Duration::from_micros(us.max(1));
            }
            _ => {
                self.misc.insert(name, value);
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            queue_size: 8192,
            buffer_size: 32768,
            stack_size: 16 * 1024 * 1024,
            #[cfg(debug_assertions)]
            log_level: LevelFilter::DEBUG,
            #[cfg(not(debug_assertions))]
            log_level: LevelFilter::INFO,
            idle_timeout: Duration::from_millis(1),
            misc: HashMap::new(),
        }
    }
}

fn config_parse<T: FromStr>(name: &str, v: &Value, target: &mut T) {
    match v.clone().into_string().map(|s| s.parse::<T>()) {
        Ok(Ok(v)) => *target = v,
        _ => warn!("invalid config value for {name}: {v:?}, keeping previous value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults() {
        let c = Config::from_toml(
            r#"
            buffer_size = 4096
            log_level = "warn"
            idle_timeout_us = 250
            my_key = 12
            "#,
        );
        assert_eq!(c.buffer_size, 4096);
        assert_eq!(c.log_level, LevelFilter::WARN);
        assert_eq!(c.idle_timeout, Duration::from_micros(250));
        assert_eq!(c.queue_size, Config::default().queue_size);
        assert_eq!(c.get::<u32>("my_key"), Some(12));
        assert_eq!(c.get::<u32>("other"), None);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let mut c = Config::default();
        c.set("buffer_size", "lots");
        assert_eq!(c.buffer_size, Config::default().buffer_size);
        c.set("buffer_size", 1024u64);
        assert_eq!(c.buffer_size, 1024);
    }
}
