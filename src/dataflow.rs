//! Local partitioned collection substrate.
//!
//! A [`DataSet`] is a list of lazily evaluated partitions. Element-wise
//! combinators (`map`, `flat_map`, `filter`, `union`) only wrap the partition
//! iterators; the pipeline runs when a sink (`collect`, `count`) or a
//! pipeline breaker (`join`, `distinct`, `group_by_key`, `broadcast`) drains
//! it. Draining happens on the environment's rayon pool, one task per
//! partition, with the job's [`CancelToken`] checked per element.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::config::ExecutionConfig;
use crate::types::{EpgmError, Result};

/// One lazily evaluated partition.
pub type Partition<T> = Box<dyn Iterator<Item = T> + Send>;

/// Job-granular cancellation flag shared by an environment and its jobs.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every job using this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Worker pool, default parallelism and cancellation token for jobs.
#[derive(Clone)]
pub struct ExecutionEnvironment {
    parallelism: usize,
    pool: Arc<ThreadPool>,
    cancel: CancelToken,
}

impl fmt::Debug for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEnvironment")
            .field("parallelism", &self.parallelism)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ExecutionEnvironment {
    /// Creates an environment with `parallelism` workers; `0` uses the
    /// number of available cores.
    pub fn new(parallelism: usize) -> Result<Self> {
        let parallelism = if parallelism == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            parallelism
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|idx| format!("epgm-worker-{idx}"))
            .build()
            .map_err(|err| EpgmError::Config(format!("failed to build worker pool: {err}")))?;
        debug!(parallelism, "execution environment created");
        Ok(Self {
            parallelism,
            pool: Arc::new(pool),
            cancel: CancelToken::new(),
        })
    }

    /// Creates an environment from configuration.
    pub fn from_config(config: &ExecutionConfig) -> Result<Self> {
        Self::new(config.parallelism)
    }

    /// Number of partitions new data sets are split into.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Token cancelling every job of this environment.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Distributes `items` over [`ExecutionEnvironment::parallelism`] partitions.
    pub fn from_vec<T: Send + 'static>(&self, items: Vec<T>) -> DataSet<T> {
        DataSet::from_vec(self, items)
    }
}

/// Read-only value shared with every partition of a job.
#[derive(Debug)]
pub struct Broadcast<T>(Arc<Vec<T>>);

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Broadcast(Arc::clone(&self.0))
    }
}

impl<T> Deref for Broadcast<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

/// Partitioned, lazily evaluated collection.
pub struct DataSet<T> {
    env: ExecutionEnvironment,
    partitions: Vec<Partition<T>>,
}

impl<T> fmt::Debug for DataSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSet")
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

impl<T: Send + 'static> DataSet<T> {
    /// Splits `items` into contiguous partitions.
    pub fn from_vec(env: &ExecutionEnvironment, items: Vec<T>) -> Self {
        let chunk = items.len().div_ceil(env.parallelism.max(1)).max(1);
        let mut partitions: Vec<Partition<T>> = Vec::with_capacity(env.parallelism);
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            let part: Vec<T> = items.by_ref().take(chunk).collect();
            partitions.push(Box::new(part.into_iter()));
        }
        Self {
            env: env.clone(),
            partitions,
        }
    }

    /// Creates an empty data set.
    pub fn empty(env: &ExecutionEnvironment) -> Self {
        Self {
            env: env.clone(),
            partitions: Vec::new(),
        }
    }

    /// Environment the data set runs on.
    pub fn env(&self) -> &ExecutionEnvironment {
        &self.env
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Applies `f` to every element.
    pub fn map<U, F>(self, f: F) -> DataSet<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.wrap(move |part: Partition<T>| -> Partition<U> {
            let f = Arc::clone(&f);
            Box::new(part.map(move |item| f(item)))
        })
    }

    /// Applies `f` to every element and flattens the results.
    pub fn flat_map<U, I, F>(self, f: F) -> DataSet<U>
    where
        U: Send + 'static,
        I: IntoIterator<Item = U> + 'static,
        I::IntoIter: Send + 'static,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.wrap(move |part: Partition<T>| -> Partition<U> {
            let f = Arc::clone(&f);
            Box::new(part.flat_map(move |item| f(item)))
        })
    }

    /// Keeps the elements satisfying `f`.
    pub fn filter<F>(self, f: F) -> DataSet<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.wrap(move |part: Partition<T>| -> Partition<T> {
            let f = Arc::clone(&f);
            Box::new(part.filter(move |item| f(item)))
        })
    }

    /// Concatenates the partitions of both data sets.
    pub fn union(mut self, other: DataSet<T>) -> DataSet<T> {
        self.partitions.extend(other.partitions);
        self
    }

    fn wrap<U>(self, f: impl Fn(Partition<T>) -> Partition<U>) -> DataSet<U> {
        DataSet {
            env: self.env,
            partitions: self.partitions.into_iter().map(f).collect(),
        }
    }

    /// Drains every partition in parallel and concatenates them in
    /// partition order.
    pub fn collect(self) -> Result<Vec<T>> {
        let DataSet { env, partitions } = self;
        let count = partitions.len();
        let cancel = env.cancel.clone();
        let drained: Vec<Result<Vec<T>>> = env.pool.install(|| {
            partitions
                .into_par_iter()
                .map(|part| drain(part, &cancel))
                .collect()
        });
        let mut out = Vec::new();
        for part in drained {
            out.extend(part?);
        }
        debug!(partitions = count, rows = out.len(), "dataflow job finished");
        Ok(out)
    }

    /// Counts the elements.
    pub fn count(self) -> Result<usize> {
        let DataSet { env, partitions } = self;
        let cancel = env.cancel.clone();
        let counts: Vec<Result<usize>> = env.pool.install(|| {
            partitions
                .into_par_iter()
                .map(|part| drain_with(part, &cancel, 0usize, |acc, _| *acc += 1))
                .collect()
        });
        counts.into_iter().sum()
    }

    /// Materialises the data set as a value shared with later jobs.
    pub fn broadcast(self) -> Result<Broadcast<T>> {
        Ok(Broadcast(Arc::new(self.collect()?)))
    }

    /// Equi-joins every element with the matching elements of `build`.
    ///
    /// `build` is drained and hashed once, then shared with every partition
    /// of `self`, which stays lazy.
    pub fn join<U, K, FL, FR>(self, build: DataSet<U>, probe_key: FL, build_key: FR) -> Result<DataSet<(T, U)>>
    where
        T: Clone,
        U: Clone + Send + Sync + 'static,
        K: Eq + Hash + Send + Sync + 'static,
        FL: Fn(&T) -> K + Send + Sync + 'static,
        FR: Fn(&U) -> K,
    {
        let mut table: FxHashMap<K, Vec<U>> = FxHashMap::default();
        for item in build.collect()? {
            table.entry(build_key(&item)).or_default().push(item);
        }
        debug!(keys = table.len(), "join build side hashed");
        let table = Arc::new(table);
        Ok(self.flat_map(move |item: T| {
            let matches = table
                .get(&probe_key(&item))
                .map(|rows| rows.to_vec())
                .unwrap_or_default();
            matches
                .into_iter()
                .map(move |row| (item.clone(), row))
                .collect::<Vec<_>>()
        }))
    }

    /// Removes duplicates, keeping the first occurrence.
    pub fn distinct(self) -> Result<DataSet<T>>
    where
        T: Eq + Hash + Clone,
    {
        let env = self.env.clone();
        let mut seen = FxHashSet::default();
        let unique: Vec<T> = self
            .collect()?
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect();
        Ok(DataSet::from_vec(&env, unique))
    }
}

impl<K, V> DataSet<(K, V)>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Groups values by key; group order follows first occurrence.
    pub fn group_by_key(self) -> Result<DataSet<(K, Vec<V>)>> {
        let env = self.env.clone();
        let mut slots: FxHashMap<K, usize> = FxHashMap::default();
        let mut groups: Vec<(K, Vec<V>)> = Vec::new();
        for (key, value) in self.collect()? {
            match slots.get(&key) {
                Some(&idx) => groups[idx].1.push(value),
                None => {
                    slots.insert(key.clone(), groups.len());
                    groups.push((key, vec![value]));
                }
            }
        }
        Ok(DataSet::from_vec(&env, groups))
    }
}

fn drain<T>(part: Partition<T>, cancel: &CancelToken) -> Result<Vec<T>> {
    drain_with(part, cancel, Vec::new(), |acc, item| acc.push(item))
}

fn drain_with<T, A>(
    part: Partition<T>,
    cancel: &CancelToken,
    init: A,
    step: impl Fn(&mut A, T),
) -> Result<A> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut acc = init;
        for item in part {
            if cancel.is_cancelled() {
                return Err(EpgmError::Cancelled);
            }
            step(&mut acc, item);
        }
        if cancel.is_cancelled() {
            return Err(EpgmError::Cancelled);
        }
        Ok(acc)
    }));
    match outcome {
        Ok(result) => result,
        Err(payload) => Err(EpgmError::Execution(format!(
            "worker panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}
