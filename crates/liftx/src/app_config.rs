//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every operator at 3am) 🦆
//!
//! 🏗️ Powered by Figment. Layers, bottom to top:
//! 1. `SNOWFLAKE_*` env vars, mapped onto `[warehouse]` (`SNOWFLAKE_ACCOUNT` → `warehouse.account`).
//!    The old deployment already exported these and nobody wants to rename them.
//! 2. `LIFTX_*` env vars, `__` for nesting (`LIFTX_LOAD__TABLE` → `load.table`).
//! 3. The TOML file, if one was given. The file wins.
//!
//! Every table has defaults, so an empty file (or no file) still produces a config.
//! Whether that config can actually *run* is checked later, per variant.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::materializer::MaterializerConfig;
use crate::stages::StageConfig;
use crate::triggers::LoadConfig;
use crate::warehouse::WarehouseConfig;

/// 📦 Everything liftx needs to know about itself.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    /// 📦 Required by the staged variants, ignored by direct insert.
    #[serde(default)]
    pub stage: Option<StageConfig>,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub materializer: MaterializerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🏃 Knobs about the process itself rather than the data.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RuntimeConfig {
    /// 📊 Show a spinner on stderr. Off by default: cron has no terminal.
    #[serde(default)]
    pub progress: bool,
}

/// 🚀 Load the config from the environment and, optionally, a TOML file.
///
/// - `None`: env vars only. No file is assumed.
/// - `Some(path)`: env vars with the file merged on top. The file wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new()
        .merge(
            Env::prefixed("SNOWFLAKE_").map(|key| format!("warehouse.{}", key.as_str()).into()),
        )
        .merge(Env::prefixed("LIFTX_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LIFTX_*, SNOWFLAKE_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LIFTX_*, SNOWFLAKE_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materializer::{NestedEncoding, ParquetCompression};
    use figment::Jail;

    #[test]
    fn the_one_where_an_empty_file_still_gets_the_old_deployment_defaults() {
        let config: AppConfig = toml::from_str("").expect("💀 empty TOML should be a valid config");
        assert_eq!(config.warehouse.role, "INGEST");
        assert_eq!(config.warehouse.database, "INGEST");
        assert_eq!(config.warehouse.schema, "INGEST");
        assert_eq!(config.warehouse.warehouse, "INGEST");
        assert_eq!(config.warehouse.token_type, "KEYPAIR_JWT");
        assert_eq!(config.load.namespace(), "@%lift_tickets");
        assert_eq!(config.load.pipe, "INGEST.INGEST.LIFT_TICKETS_PIPE");
        assert_eq!(config.materializer.compression, ParquetCompression::Snappy);
        assert_eq!(config.materializer.nested_encoding, NestedEncoding::Struct);
        assert!(config.stage.is_none());
        assert!(!config.runtime.progress);
    }

    #[test]
    fn the_one_where_every_table_comes_from_the_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [warehouse]
            account = "xy12345"
            user = "LIFTX"
            token = "jwt"
            request_timeout_secs = 30

            [stage.Http]
            url = "https://uploads.example.com/tickets"

            [load]
            table = "lift_tickets_py_copy_into"
            stage_namespace = "@INGEST.INGEST.TICKET_STAGE"

            [materializer]
            compression = "zstd"
            nested_encoding = "json_text"

            [runtime]
            progress = true
            "#,
        )
        .expect("💀 the full config should parse");

        assert_eq!(config.warehouse.request_timeout_secs, 30);
        assert_eq!(config.load.table, "lift_tickets_py_copy_into");
        assert_eq!(config.load.namespace(), "@INGEST.INGEST.TICKET_STAGE");
        assert_eq!(config.materializer.compression, ParquetCompression::Zstd);
        assert_eq!(config.materializer.nested_encoding, NestedEncoding::JsonText);
        assert!(config.runtime.progress);
        match config.stage {
            Some(StageConfig::Http(http)) => {
                assert_eq!(http.url, "https://uploads.example.com/tickets");
                assert!(http.token.is_none());
            }
            honestly_who_knows => panic!("💀 expected an Http stage, serde took us to {honestly_who_knows:?}"),
        }
    }

    #[test]
    fn the_one_where_the_old_env_vars_still_work_and_the_file_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("SNOWFLAKE_ACCOUNT", "envaccount");
            jail.set_env("SNOWFLAKE_USER", "ENVUSER");
            jail.set_env("SNOWFLAKE_TOKEN", "env-token");
            jail.set_env("LIFTX_LOAD__TABLE", "from_env");
            jail.set_env("LIFTX_RUNTIME__PROGRESS", "true");
            jail.create_file(
                "liftx.toml",
                r#"
                stage = "InMemory"

                [warehouse]
                user = "FILEUSER"
                "#,
            )?;

            let config = load_config(Some(Path::new("liftx.toml"))).map_err(|e| format!("{e:#}"))?;
            assert_eq!(config.warehouse.account.as_deref(), Some("envaccount"));
            assert_eq!(config.warehouse.user.as_deref(), Some("FILEUSER"));
            assert_eq!(config.warehouse.token.as_deref(), Some("env-token"));
            assert_eq!(config.load.table, "from_env");
            assert!(config.runtime.progress);
            assert!(matches!(config.stage, Some(StageConfig::InMemory)));
            Ok(())
        });
    }

    #[test]
    fn the_one_where_a_broken_file_names_itself_in_the_error() {
        Jail::expect_with(|jail| {
            jail.create_file("broken.toml", "[materializer]\ncompression = \"lzma\"\n")?;
            let err = load_config(Some(Path::new("broken.toml"))).unwrap_err();
            assert!(format!("{err:#}").contains("broken.toml"));
            Ok(())
        });
    }
}
