pub mod loader;

pub use loader::{ConfigResolver, ConfigurationError, EnvSource, MapEnv, SystemEnv};
