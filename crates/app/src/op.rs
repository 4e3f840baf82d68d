use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use common::prelude::*;
use object_store::ObjectStoreConfig;

/// Data directory used when neither the flag nor the config names one.
pub const DEFAULT_DATA_DIR: &str = ".blobfs";
const PAYLOADS_DIR_NAME: &str = "payloads";

/// Resolve the engine configuration.
///
/// Priority for the data directory: explicit `--data-dir` flag > config
/// file `storage.data_dir` > `./.blobfs`. A config without object storage
/// keeps payloads next to the databases.
pub fn resolve_config(
    config_path: Option<&Path>,
    data_dir: Option<PathBuf>,
    container: Option<String>,
) -> anyhow::Result<EngineConfig> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let dir = data_dir
        .or_else(|| config.storage.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    if config.storage.objects == ObjectStoreConfig::Memory {
        config.storage.objects = ObjectStoreConfig::Local {
            path: dir.join(PAYLOADS_DIR_NAME),
        };
    }
    config.storage.data_dir = Some(dir);
    if let Some(container) = container {
        config.container = container;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Connections per container
    pub clients: Arc<ContainerClients>,
    /// Counters of every backend call made by the ops
    pub stats: Arc<StatsObserver>,
}

impl OpContext {
    pub fn new(config: EngineConfig) -> Self {
        let stats = Arc::new(StatsObserver::new());
        Self {
            clients: Arc::new(ContainerClients::new(config, stats.clone())),
            stats,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.clients.config()
    }

    /// Connection to the selected container.
    pub async fn connection(&self) -> Result<Arc<dyn Connection>, EngineError> {
        self.clients.default_container().await
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
