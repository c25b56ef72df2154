//! Hierarchical environment-variable config resolver.
//!
//! Grounded on the teacher's `infrastructure/config/loader.rs`
//! (`ConfigLoader`: one type, a `thiserror` error enum, `load` +
//! `validate` split), reimplemented over `std::env` directly instead of
//! `figment` — see DESIGN.md for why figment's layer-merge model doesn't
//! fit the six-tier, per-property-composed key precedence required here.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::models::config::{HandlerDefaults, ResolvedOptions};

/// Raised by the Config Resolver on a malformed recognized-key value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("invalid integer value for {property}: {value:?}")]
    InvalidInt { property: &'static str, value: String },
    #[error("invalid boolean value for {property}: {value:?} (expected true/1/yes or false/0/no)")]
    InvalidBool { property: &'static str, value: String },
}

/// Abstraction over the environment-variable store, so tests can resolve
/// against a fake map instead of the real process environment.
pub trait EnvSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnv;

impl EnvSource for SystemEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// An in-memory environment, for deterministic tests of config resolution.
#[derive(Debug, Default, Clone)]
pub struct MapEnv(pub HashMap<String, String>);

impl EnvSource for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyType {
    Int,
    Bool,
    Str,
}

struct PropertyDescriptor {
    /// Dotted/underscored property name, e.g. `poll_interval_millis`.
    name: &'static str,
    kind: PropertyType,
}

const PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor { name: "poll_interval_millis", kind: PropertyType::Int },
    PropertyDescriptor { name: "max_concurrent", kind: PropertyType::Int },
    PropertyDescriptor { name: "domain", kind: PropertyType::Str },
    PropertyDescriptor { name: "worker_id", kind: PropertyType::Str },
    PropertyDescriptor { name: "poll_timeout_millis", kind: PropertyType::Int },
    PropertyDescriptor { name: "register_task_def", kind: PropertyType::Bool },
    PropertyDescriptor { name: "overwrite_task_def", kind: PropertyType::Bool },
    PropertyDescriptor { name: "strict_schema", kind: PropertyType::Bool },
    PropertyDescriptor { name: "paused", kind: PropertyType::Bool },
];

/// Produces a [`ResolvedOptions`] for one handler by consulting a
/// hierarchical environment source.
pub struct ConfigResolver<E: EnvSource> {
    env: E,
}

impl ConfigResolver<SystemEnv> {
    /// A resolver backed by the real process environment.
    #[must_use]
    pub fn system() -> Self {
        Self { env: SystemEnv }
    }
}

impl<E: EnvSource> ConfigResolver<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Look up the raw string value for `property`, trying the five
    /// env-backed tiers in precedence order, or `None`
    /// if none are set.
    fn resolve_raw(&self, handler_name: &str, property: &str) -> Option<String> {
        let handler_lower = handler_name.to_lowercase();
        let handler_upper = handler_name.to_uppercase().replace(['-', '.'], "_");
        let property_upper = property.to_uppercase();

        let candidates = [
            format!("conductor.worker.{handler_lower}.{property}"),
            format!("CONDUCTOR_WORKER_{handler_upper}_{property_upper}"),
            format!("conductor.worker.all.{property}"),
            "CONDUCTOR_WORKER_ALL_".to_string() + &property_upper,
            format!("CONDUCTOR_WORKER_{property_upper}"),
        ];

        candidates.iter().find_map(|key| self.env.get(key))
    }

    fn coerce_int(property: &'static str, raw: &str) -> Result<i64, ConfigurationError> {
        raw.trim()
            .parse::<i64>()
            .map_err(|_| ConfigurationError::InvalidInt { property, value: raw.to_string() })
    }

    fn coerce_bool(property: &'static str, raw: &str) -> Result<bool, ConfigurationError> {
        match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigurationError::InvalidBool { property, value: raw.to_string() }),
        }
    }

    /// Resolve an int-typed property through all seven tiers.
    fn resolve_int(
        &self,
        handler_name: &str,
        descriptor: &PropertyDescriptor,
        handler_default: Option<i64>,
        system_default: i64,
    ) -> Result<i64, ConfigurationError> {
        if let Some(raw) = self.resolve_raw(handler_name, descriptor.name) {
            return Self::coerce_int(descriptor.name, &raw);
        }
        Ok(handler_default.unwrap_or(system_default))
    }

    fn resolve_bool(
        &self,
        handler_name: &str,
        descriptor: &PropertyDescriptor,
        handler_default: Option<bool>,
        system_default: bool,
    ) -> Result<bool, ConfigurationError> {
        if let Some(raw) = self.resolve_raw(handler_name, descriptor.name) {
            return Self::coerce_bool(descriptor.name, &raw);
        }
        Ok(handler_default.unwrap_or(system_default))
    }

    fn resolve_string(
        &self,
        handler_name: &str,
        property: &str,
        handler_default: Option<String>,
        system_default: String,
    ) -> String {
        self.resolve_raw(handler_name, property)
            .or(handler_default)
            .unwrap_or(system_default)
    }

    /// Produce a fully-resolved option set for `handler_name`.
    ///
    /// Unknown keys in the environment are simply never looked up — this
    /// resolver only ever reads the recognized property names.
    pub fn resolve(
        &self,
        handler_name: &str,
        defaults: &HandlerDefaults,
    ) -> Result<ResolvedOptions, ConfigurationError> {
        let system = ResolvedOptions::default();

        let poll_interval_millis = self.resolve_int(
            handler_name,
            &PROPERTIES[0],
            defaults.poll_interval_millis.map(|v| v as i64),
            system.poll_interval_millis as i64,
        )?;
        let max_concurrent = self.resolve_int(
            handler_name,
            &PROPERTIES[1],
            defaults.max_concurrent.map(|v| v as i64),
            system.max_concurrent as i64,
        )?;
        let domain = self.resolve_string(
            handler_name,
            PROPERTIES[2].name,
            defaults.domain.clone(),
            system.domain.clone(),
        );
        let worker_id = self.resolve_string(
            handler_name,
            PROPERTIES[3].name,
            defaults.worker_id.clone(),
            system.worker_id.clone(),
        );
        let poll_timeout_millis = self.resolve_int(
            handler_name,
            &PROPERTIES[4],
            defaults.poll_timeout_millis.map(|v| v as i64),
            system.poll_timeout_millis as i64,
        )?;
        let register_task_def = self.resolve_bool(
            handler_name,
            &PROPERTIES[5],
            defaults.register_task_def,
            system.register_task_def,
        )?;
        let overwrite_task_def = self.resolve_bool(
            handler_name,
            &PROPERTIES[6],
            defaults.overwrite_task_def,
            system.overwrite_task_def,
        )?;
        let strict_schema = self.resolve_bool(
            handler_name,
            &PROPERTIES[7],
            defaults.strict_schema,
            system.strict_schema,
        )?;
        let paused = self.resolve_bool(handler_name, &PROPERTIES[8], defaults.paused, system.paused)?;

        Ok(ResolvedOptions {
            poll_interval_millis: poll_interval_millis.max(0) as u64,
            max_concurrent: max_concurrent.max(0) as usize,
            domain,
            worker_id,
            poll_timeout_millis: poll_timeout_millis.max(0) as u64,
            register_task_def,
            overwrite_task_def,
            strict_schema,
            paused,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> MapEnv {
        MapEnv(pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect())
    }

    #[test]
    fn falls_back_to_system_defaults_when_nothing_set() {
        let resolver = ConfigResolver::new(MapEnv::default());
        let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
        assert_eq!(resolved, ResolvedOptions::default());
    }

    #[test]
    fn handler_code_default_beats_system_default() {
        let resolver = ConfigResolver::new(MapEnv::default());
        let defaults = HandlerDefaults { max_concurrent: Some(5), ..Default::default() };
        let resolved = resolver.resolve("greet", &defaults).unwrap();
        assert_eq!(resolved.max_concurrent, 5);
    }

    #[test]
    fn legacy_global_env_beats_handler_code_default() {
        let resolver = ConfigResolver::new(env(&[("CONDUCTOR_WORKER_MAX_CONCURRENT", "7")]));
        let defaults = HandlerDefaults { max_concurrent: Some(5), ..Default::default() };
        let resolved = resolver.resolve("greet", &defaults).unwrap();
        assert_eq!(resolved.max_concurrent, 7);
    }

    #[test]
    fn worker_all_uppercase_beats_legacy_global() {
        let resolver = ConfigResolver::new(env(&[
            ("CONDUCTOR_WORKER_MAX_CONCURRENT", "7"),
            ("CONDUCTOR_WORKER_ALL_MAX_CONCURRENT", "9"),
        ]));
        let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
        assert_eq!(resolved.max_concurrent, 9);
    }

    #[test]
    fn worker_all_dotted_beats_uppercase_all() {
        let resolver = ConfigResolver::new(env(&[
            ("CONDUCTOR_WORKER_ALL_MAX_CONCURRENT", "9"),
            ("conductor.worker.all.max_concurrent", "11"),
        ]));
        let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
        assert_eq!(resolved.max_concurrent, 11);
    }

    #[test]
    fn handler_specific_uppercase_beats_worker_all_dotted() {
        let resolver = ConfigResolver::new(env(&[
            ("conductor.worker.all.max_concurrent", "11"),
            ("CONDUCTOR_WORKER_GREET_MAX_CONCURRENT", "13"),
        ]));
        let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
        assert_eq!(resolved.max_concurrent, 13);
    }

    #[test]
    fn handler_specific_dotted_has_highest_precedence() {
        let resolver = ConfigResolver::new(env(&[
            ("CONDUCTOR_WORKER_GREET_MAX_CONCURRENT", "13"),
            ("conductor.worker.greet.max_concurrent", "17"),
        ]));
        let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
        assert_eq!(resolved.max_concurrent, 17);
    }

    #[test]
    fn handler_name_is_case_insensitive_in_uppercase_tier() {
        let resolver = ConfigResolver::new(env(&[("CONDUCTOR_WORKER_MY_HANDLER_MAX_CONCURRENT", "3")]));
        let resolved = resolver.resolve("My-Handler", &HandlerDefaults::default()).unwrap();
        assert_eq!(resolved.max_concurrent, 3);
    }

    #[test]
    fn rejects_non_numeric_int() {
        let resolver = ConfigResolver::new(env(&[("CONDUCTOR_WORKER_ALL_MAX_CONCURRENT", "lots")]));
        let err = resolver.resolve("greet", &HandlerDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidInt { .. }));
    }

    #[test]
    fn bool_accepts_documented_truthy_and_falsy_spellings() {
        for (raw, expected) in [
            ("true", true),
            ("TRUE", true),
            ("1", true),
            ("yes", true),
            ("YES", true),
            ("false", false),
            ("0", false),
            ("no", false),
        ] {
            let resolver = ConfigResolver::new(env(&[("CONDUCTOR_WORKER_ALL_PAUSED", raw)]));
            let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
            assert_eq!(resolved.paused, expected, "raw={raw}");
        }
    }

    #[test]
    fn rejects_unrecognized_bool_spelling() {
        let resolver = ConfigResolver::new(env(&[("CONDUCTOR_WORKER_ALL_PAUSED", "maybe")]));
        let err = resolver.resolve("greet", &HandlerDefaults::default()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidBool { .. }));
    }

    #[test]
    fn resolution_is_pure() {
        let env_map = env(&[("conductor.worker.greet.domain", "billing")]);
        let resolver = ConfigResolver::new(env_map);
        let a = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
        let b = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_domain_default_is_empty_string() {
        let resolver = ConfigResolver::new(MapEnv::default());
        let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
        assert_eq!(resolved.domain, "");
    }

    #[test]
    fn system_env_resolver_reads_real_process_environment() {
        temp_env::with_var("CONDUCTOR_WORKER_GREET_MAX_CONCURRENT", Some("6"), || {
            let resolver = ConfigResolver::system();
            let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
            assert_eq!(resolved.max_concurrent, 6);
        });
    }

    proptest::proptest! {
        /// Any positive integer written in base 10 round-trips through the
        /// int coercion rule.
        #[test]
        fn any_nonnegative_int_round_trips(n in 0i64..1_000_000) {
            let resolver = ConfigResolver::new(env(&[("CONDUCTOR_WORKER_ALL_MAX_CONCURRENT", &n.to_string())]));
            let resolved = resolver.resolve("greet", &HandlerDefaults::default()).unwrap();
            prop_assert_eq!(resolved.max_concurrent as i64, n);
        }

        /// Resolution is pure for arbitrary handler names.
        #[test]
        fn resolution_is_pure_for_any_handler_name(name in "[a-zA-Z][a-zA-Z0-9_-]{0,20}") {
            let resolver = ConfigResolver::new(MapEnv::default());
            let a = resolver.resolve(&name, &HandlerDefaults::default()).unwrap();
            let b = resolver.resolve(&name, &HandlerDefaults::default()).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
