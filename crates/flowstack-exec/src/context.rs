//! Everything a unit of work needs that outlives its chains.

use std::sync::Arc;

use flowstack_core::config::TaskConfig;
use flowstack_core::id::TaskId;
use flowstack_io::build_storage_from_config;
use flowstack_mem::{Codec, SpillManager, SpillableListFactory, Storage, TupleCollectionFactory};
use flowstack_operators::{ChainResources, ShuffleWriter};

use crate::error::Result;
use crate::metrics::TaskCounters;

pub struct TaskContext {
    id: TaskId,
    config: TaskConfig,
    spill: Arc<SpillManager>,
    counters: Arc<TaskCounters>,
}

impl TaskContext {
    /// Select the spill backend from `config` and root it under a directory
    /// private to this task.
    pub fn new(config: TaskConfig) -> Result<Self> {
        let storage = build_storage_from_config(&config.storage_config())?;
        Self::with_storage(config, storage)
    }

    pub fn from_env() -> Result<Self> {
        Self::new(TaskConfig::from_env())
    }

    /// Use a caller-provided backend, e.g. a `MemoryStorage` a test keeps a
    /// handle to.
    pub fn with_storage(config: TaskConfig, storage: Box<dyn Storage>) -> Result<Self> {
        let id = TaskId::random();
        let codec = Codec::from_name(&config.spill_codec)?;
        let root = format!(
            "{}/{}",
            config.storage_config().root.trim_end_matches('/'),
            id
        );

        #[cfg(feature = "tracing")]
        tracing::info!(
            task = %id,
            spill_root = %root,
            codec = codec.name(),
            threshold = config.spill_threshold_tuples,
            "task context ready"
        );

        Ok(Self {
            id,
            spill: Arc::new(SpillManager::new(storage, codec, root)),
            config,
            counters: Arc::new(TaskCounters::new()),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn spill_manager(&self) -> &Arc<SpillManager> {
        &self.spill
    }

    pub fn counters(&self) -> &Arc<TaskCounters> {
        &self.counters
    }

    /// Collections backing co-group buffers, spilling per the task config.
    pub fn collections(&self) -> Arc<dyn TupleCollectionFactory> {
        Arc::new(SpillableListFactory::from_config(
            Arc::clone(&self.spill),
            &self.config,
        ))
    }

    pub fn chain_resources(&self, shuffle: Option<Arc<dyn ShuffleWriter>>) -> ChainResources {
        ChainResources {
            shuffle,
            collections: Some(self.collections()),
            spill_counters: Arc::clone(self.counters.spill()),
        }
    }
}

#[cfg(test)]
mod tests {
    use flowstack_mem::TupleCollection;

    use super::*;
    use crate::error::ExecError;

    #[test]
    fn test_spill_root_is_task_scoped() {
        let config = TaskConfig {
            spill_uri: Some("memory://scratch/".into()),
            ..TaskConfig::default()
        };
        let a = TaskContext::new(config.clone()).unwrap();
        let b = TaskContext::new(config).unwrap();

        assert!(a.spill_manager().root_dir().starts_with("memory://scratch/task-"));
        assert_ne!(a.spill_manager().root_dir(), b.spill_manager().root_dir());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_filesystem_spills_land_under_task_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = TaskConfig {
            spill_dir: dir.path().to_string_lossy().to_string(),
            spill_threshold_tuples: 1,
            ..TaskConfig::default()
        };
        let ctx = TaskContext::new(config).unwrap();
        let task_dir = dir.path().join(ctx.id().to_string());

        let mut list = ctx.collections().create(None);
        list.add(flowstack_core::tuple!["a"]).unwrap();
        list.add(flowstack_core::tuple!["b"]).unwrap();
        assert_eq!(list.spill_count(), 2);
        assert_eq!(std::fs::read_dir(&task_dir).unwrap().count(), 2);

        list.clear().unwrap();
        assert_eq!(std::fs::read_dir(&task_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_unknown_codec_and_scheme() {
        let config = TaskConfig {
            spill_codec: "brotli".into(),
            ..TaskConfig::default()
        };
        assert!(matches!(TaskContext::new(config), Err(ExecError::Spill(_))));

        let config = TaskConfig {
            spill_uri: Some("s3://bucket".into()),
            ..TaskConfig::default()
        };
        assert!(matches!(TaskContext::new(config), Err(ExecError::Io(_))));
    }
}
