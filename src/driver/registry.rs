use std::rc::Rc;

use super::{Driver, DummyDriver, MysqlDriver, PostgresDriver, SqliteDriver};
use crate::core::RegistryError;

/// A registered driver: lookup key, human-readable name, and the factory.
#[derive(Clone)]
pub struct DriverDescriptor {
    pub key: String,
    pub display_name: String,
    pub factory: Rc<dyn Driver>,
}

impl std::fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Driver key → factory table, in registration order.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: Vec<DriverDescriptor>,
}

impl DriverRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `dummy`, `mysql`, `postgresql` and `sqlite` drivers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, Rc<dyn Driver>); 4] = [
            ("dummy", Rc::new(DummyDriver::new())),
            ("mysql", Rc::new(MysqlDriver)),
            ("postgresql", Rc::new(PostgresDriver)),
            ("sqlite", Rc::new(SqliteDriver)),
        ];
        for (key, factory) in builtins {
            // Keys are distinct, so this cannot fail.
            let _ = registry.register(key, factory, false);
        }
        registry
    }

    pub fn register(
        &mut self,
        key: &str,
        factory: Rc<dyn Driver>,
        allow_overwrite: bool,
    ) -> Result<(), RegistryError> {
        let descriptor = DriverDescriptor {
            key: key.to_string(),
            display_name: factory.display_name().to_string(),
            factory,
        };

        match self.drivers.iter_mut().find(|d| d.key == key) {
            Some(_) if !allow_overwrite => Err(RegistryError::Duplicate(key.to_string())),
            Some(existing) => {
                tracing::debug!(key, "replacing driver");
                *existing = descriptor;
                Ok(())
            }
            None => {
                tracing::debug!(key, name = %descriptor.display_name, "registering driver");
                self.drivers.push(descriptor);
                Ok(())
            }
        }
    }

    /// Registers the factory named by `factory_name`, as written in the
    /// `[drivers]` configuration section.
    pub fn register_factory_name(
        &mut self,
        key: &str,
        factory_name: &str,
        allow_overwrite: bool,
    ) -> Result<(), RegistryError> {
        let factory = builtin_factory(factory_name)
            .ok_or_else(|| RegistryError::UnknownFactory(factory_name.to_string()))?;
        self.register(key, factory, allow_overwrite)
    }

    pub fn resolve(&self, key: &str) -> Result<&DriverDescriptor, RegistryError> {
        self.drivers
            .iter()
            .find(|d| d.key == key)
            .ok_or_else(|| RegistryError::Unknown(key.to_string()))
    }

    #[must_use]
    pub fn list_keys(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.key.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DriverDescriptor> {
        self.drivers.iter()
    }
}

/// Looks up a driver factory by short name or by its full type path.
#[must_use]
pub fn builtin_factory(name: &str) -> Option<Rc<dyn Driver>> {
    match name.trim() {
        "dummy" | "sqlcmd::driver::dummy::DummyDriver" => Some(Rc::new(DummyDriver::new())),
        "mysql" | "sqlcmd::driver::mysql::MysqlDriver" => Some(Rc::new(MysqlDriver)),
        "postgres" | "postgresql" | "sqlcmd::driver::postgresql::PostgresDriver" => {
            Some(Rc::new(PostgresDriver))
        }
        "sqlite" | "sqlcmd::driver::sqlite::SqliteDriver" => Some(Rc::new(SqliteDriver)),
        _ => None,
    }
}
