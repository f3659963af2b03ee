//! Test environment configuration, so integration-style tests can be
//! skipped cleanly when no broker/database is available locally.

use once_cell::sync::Lazy;
use std::env;

pub struct TestConfig {
    pub use_in_memory_store: bool,
    pub use_in_memory_bus: bool,
    pub disable_external_services: bool,
    pub test_database_url: Option<String>,
}

impl TestConfig {
    pub fn from_env() -> Self {
        Self {
            use_in_memory_store: env::var("TEST_USE_IN_MEMORY_STORE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            use_in_memory_bus: env::var("TEST_USE_IN_MEMORY_BUS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            disable_external_services: env::var("TEST_DISABLE_EXTERNAL_SERVICES")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            test_database_url: env::var("TEST_DATABASE_URL").ok(),
        }
    }

    pub fn is_ci() -> bool {
        env::var("CI").is_ok() || env::var("GITHUB_ACTIONS").is_ok()
    }

    pub fn skip_integration_tests() -> bool {
        env::var("SKIP_INTEGRATION_TESTS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false)
    }
}

pub static TEST_CONFIG: Lazy<TestConfig> = Lazy::new(TestConfig::from_env);

/// Skip a test that needs a real Postgres/RabbitMQ instance.
#[macro_export]
macro_rules! skip_without_external_services {
    () => {
        if $crate::testing::test_config::TEST_CONFIG.disable_external_services {
            eprintln!("skipping test that requires external services");
            return;
        }
    };
}

#[macro_export]
macro_rules! skip_in_ci {
    () => {
        if $crate::testing::test_config::TestConfig::is_ci() {
            eprintln!("skipping test in CI environment");
            return;
        }
    };
}
