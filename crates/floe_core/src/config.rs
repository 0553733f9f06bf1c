use std::collections::HashMap;
use std::sync::LazyLock;

use floe_error::{DbError, Result};

use crate::arrays::scalar::ScalarValue;

/// Environment variable overriding the number of threads.
pub const MAX_THREADS_ENV_VAR: &str = "FLOE_MAX_THREADS";

pub const DEFAULT_PARTITIONED_GROUPBY_THRESHOLD: usize = 1000;
pub const DEFAULT_PARTITIONED_GROUPBY_SAMPLE_SIZE: usize = 1024;
pub const DEFAULT_JOIN_CHUNK_SIZE: usize = 4096;

/// Configuration for executing operations on tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub thread_pool_size: usize,
    /// Number of partitions used by partitioned hash operations.
    pub partitions: usize,
    /// Estimated number of groups at which grouping switches to the
    /// partitioned strategy.
    pub partitioned_groupby_threshold: usize,
    pub partitioned_groupby_sample_size: usize,
    /// Number of left rows handled by a single join task.
    pub join_chunk_size: usize,
    /// Run the optimizer before executing lazy plans.
    pub optimize: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::with_threads(num_cpus::get())
    }
}

impl ExecutionConfig {
    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        ExecutionConfig {
            thread_pool_size: threads,
            partitions: threads,
            partitioned_groupby_threshold: DEFAULT_PARTITIONED_GROUPBY_THRESHOLD,
            partitioned_groupby_sample_size: DEFAULT_PARTITIONED_GROUPBY_SAMPLE_SIZE,
            join_chunk_size: DEFAULT_JOIN_CHUNK_SIZE,
            optimize: true,
        }
    }

    /// Default config, honoring `FLOE_MAX_THREADS` if set.
    pub fn from_env() -> Self {
        match std::env::var(MAX_THREADS_ENV_VAR) {
            Ok(val) => match val.trim().parse::<usize>() {
                Ok(threads) if threads > 0 => Self::with_threads(threads),
                _ => {
                    tracing::warn!(%val, "ignoring invalid {MAX_THREADS_ENV_VAR}");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn set(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = SETTING_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::not_found(format!("Missing setting for '{name}'")))?;
        (func.set)(value, self)
    }

    pub fn get(&self, name: &str) -> Result<ScalarValue> {
        let func = SETTING_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::not_found(format!("Missing setting for '{name}'")))?;
        Ok((func.get)(self))
    }

    /// Names and descriptions of all settings.
    pub fn settings() -> impl Iterator<Item = (&'static str, &'static str)> {
        let mut settings: Vec<_> = SETTING_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_unstable();
        settings.into_iter()
    }
}

struct SettingFunctions {
    description: &'static str,
    set: fn(scalar: ScalarValue, conf: &mut ExecutionConfig) -> Result<()>,
    get: fn(conf: &ExecutionConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: ConfigSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: ConfigSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static SETTING_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<ThreadPoolSize>(&mut map);
    insert_setting::<Partitions>(&mut map);
    insert_setting::<PartitionedGroupbyThreshold>(&mut map);
    insert_setting::<PartitionedGroupbySampleSize>(&mut map);
    insert_setting::<JoinChunkSize>(&mut map);
    insert_setting::<Optimize>(&mut map);

    map
});

pub trait ConfigSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ExecutionConfig) -> Result<()>;
    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue;
}

fn expect_usize(name: &str, scalar: &ScalarValue, min: usize) -> Result<usize> {
    let val = scalar.try_as_usize().ok_or_else(|| {
        DbError::invalid_argument("Setting expects a non-negative integer")
            .with_field("setting", name.to_string())
            .with_field("value", scalar.to_string())
    })?;
    if val < min {
        return Err(DbError::invalid_argument(format!(
            "Setting '{name}' cannot be less than {min}"
        )));
    }
    Ok(val)
}

const MAX_PARTITION_COUNT: usize = 512;

pub struct ThreadPoolSize;

impl ConfigSetting for ThreadPoolSize {
    const NAME: &'static str = "thread_pool_size";
    const DESCRIPTION: &'static str = "Number of threads in the execution pool";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ExecutionConfig) -> Result<()> {
        conf.thread_pool_size = expect_usize(Self::NAME, &scalar, 1)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue {
        (conf.thread_pool_size as u64).into()
    }
}

pub struct Partitions;

impl ConfigSetting for Partitions {
    const NAME: &'static str = "partitions";
    const DESCRIPTION: &'static str = "Number of partitions to use for partitioned hashing";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ExecutionConfig) -> Result<()> {
        let val = expect_usize(Self::NAME, &scalar, 1)?;
        if val > MAX_PARTITION_COUNT {
            return Err(DbError::invalid_argument(format!(
                "Partition count cannot be greater than {MAX_PARTITION_COUNT}"
            )));
        }
        conf.partitions = val;
        Ok(())
    }

    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue {
        (conf.partitions as u64).into()
    }
}

pub struct PartitionedGroupbyThreshold;

impl ConfigSetting for PartitionedGroupbyThreshold {
    const NAME: &'static str = "partitioned_groupby_threshold";
    const DESCRIPTION: &'static str =
        "Estimated group count at which grouping uses the partitioned strategy";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ExecutionConfig) -> Result<()> {
        conf.partitioned_groupby_threshold = expect_usize(Self::NAME, &scalar, 0)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue {
        (conf.partitioned_groupby_threshold as u64).into()
    }
}

pub struct PartitionedGroupbySampleSize;

impl ConfigSetting for PartitionedGroupbySampleSize {
    const NAME: &'static str = "partitioned_groupby_sample_size";
    const DESCRIPTION: &'static str = "Rows sampled when estimating the number of groups";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ExecutionConfig) -> Result<()> {
        conf.partitioned_groupby_sample_size = expect_usize(Self::NAME, &scalar, 1)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue {
        (conf.partitioned_groupby_sample_size as u64).into()
    }
}

pub struct JoinChunkSize;

impl ConfigSetting for JoinChunkSize {
    const NAME: &'static str = "join_chunk_size";
    const DESCRIPTION: &'static str = "Left rows per parallel join task";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ExecutionConfig) -> Result<()> {
        conf.join_chunk_size = expect_usize(Self::NAME, &scalar, 1)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue {
        (conf.join_chunk_size as u64).into()
    }
}

pub struct Optimize;

impl ConfigSetting for Optimize {
    const NAME: &'static str = "optimize";
    const DESCRIPTION: &'static str = "Controls if lazy plans are optimized before execution";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut ExecutionConfig) -> Result<()> {
        conf.optimize = scalar.try_as_bool().ok_or_else(|| {
            DbError::invalid_argument("Setting expects a boolean")
                .with_field("setting", Self::NAME)
                .with_field("value", scalar.to_string())
        })?;
        Ok(())
    }

    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue {
        conf.optimize.into()
    }
}
