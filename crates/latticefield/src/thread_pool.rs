use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        OnceLock,
        mpsc::{self, Receiver, TryRecvError},
    },
};

use log::trace;
pub use rayon::ThreadPool;
use rayon::ThreadPoolBuildError;

use crate::error::{ExecutionAbortedSnafu, FieldError};

static POOL: OnceLock<Result<ThreadPool, String>> = OnceLock::new();

fn shared_pool() -> Result<&'static ThreadPool, FieldError> {
    let pool = POOL.get_or_init(|| {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .stack_size(2 * 1024 * 1024)
            .thread_name(|i| format!("latticefield-{i}"));

        // Physical cores only; hyperthreads don't help with this much float math.
        if std::env::var("RAYON_NUM_THREADS").is_err() {
            builder = builder.num_threads(num_cpus::get_physical());
        }

        builder
            .build()
            .map_err(|err: ThreadPoolBuildError| err.to_string())
    });

    pool.as_ref().map_err(|message| FieldError::ThreadPool {
        message: message.clone(),
    })
}

/// Run `op` inside the shared worker pool, so that any parallel iteration it does uses those workers.
pub fn with_thread_pool<T: Send>(op: impl (FnOnce() -> T) + Send) -> Result<T, FieldError> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        Ok(shared_pool()?.install(op))
    }
    #[cfg(target_arch = "wasm32")]
    {
        Ok(op())
    }
}

/// A handle to work running in the background on the shared pool. The work's result only becomes visible through
/// [`JobHandle::complete`], which waits for it, or [`JobHandle::try_complete`], which doesn't.
#[must_use = "a job's output can only be read by completing its handle"]
pub struct JobHandle<T> {
    receiver: Receiver<std::thread::Result<T>>,
}

impl<T: Send + 'static> JobHandle<T> {
    /// Start `op` on the shared pool.
    pub fn spawn(op: impl (FnOnce() -> T) + Send + 'static) -> Result<Self, FieldError> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let job = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(op));
            // The receiver may have been dropped if nobody is waiting anymore.
            let _ = sender.send(result);
        };

        #[cfg(not(target_arch = "wasm32"))]
        shared_pool()?.spawn(job);
        #[cfg(target_arch = "wasm32")]
        job();

        Ok(Self { receiver })
    }

    /// Wait for the work to finish and take its result. Fails if the work panicked or was torn down before it could
    /// report back.
    pub fn complete(self) -> Result<T, FieldError> {
        match self.receiver.recv() {
            Ok(result) => Self::unpack(result),
            Err(_) => Self::dropped(),
        }
    }

    /// Check whether the work has finished without blocking. If it has, its result is returned; otherwise the handle
    /// is given back.
    pub fn try_complete(self) -> Result<Result<T, FieldError>, Self> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(Self::unpack(result)),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Self::dropped()),
        }
    }

    fn unpack(result: std::thread::Result<T>) -> Result<T, FieldError> {
        result.or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            ExecutionAbortedSnafu { message }.fail()
        })
    }

    fn dropped() -> Result<T, FieldError> {
        ExecutionAbortedSnafu {
            message: "worker dropped its result",
        }
        .fail()
    }
}

// `ZipChunks` and its sequential and parallel traversal are adapted from ntsc-rs
// (https://github.com/valadaptive/ntsc-rs/) which is available under MIT/ISC/Apache-2.0

/// Splits `N` equal-length output slices into matching chunks so that each chunk can be written by a different worker.
/// Chunk `i` of every slice covers the same index range, and no two chunks overlap.
pub struct ZipChunks<'a, const N: usize, T> {
    arrays: [&'a mut [T]; N],
    chunk_size: usize,
    start: usize,
}

impl<'a, const N: usize, T> ZipChunks<'a, N, T> {
    pub fn new(arrays: [&'a mut [T]; N], chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be nonzero");
        if let Some((first, rest)) = arrays.split_first() {
            for r in rest.iter() {
                assert_eq!(first.len(), r.len());
            }
        }

        Self {
            arrays,
            chunk_size,
            start: 0,
        }
    }

    pub fn len(&self) -> usize {
        match self.arrays.first() {
            Some(first) => first.len(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_chunks(&self) -> usize {
        self.len().div_ceil(self.chunk_size)
    }

    fn split_at(self, chunk_idx: usize) -> (Self, Self) {
        let split_point = (chunk_idx * self.chunk_size).min(self.len());

        let mut left_halves: [&'a mut [T]; N] = self.arrays;
        let right_halves: [&'a mut [T]; N] = std::array::from_fn(|i| {
            let whole = std::mem::take(&mut left_halves[i]);
            let (left, right) = whole.split_at_mut(split_point);
            left_halves[i] = left;
            right
        });

        (
            Self {
                arrays: left_halves,
                chunk_size: self.chunk_size,
                start: self.start,
            },
            Self {
                arrays: right_halves,
                chunk_size: self.chunk_size,
                start: self.start + chunk_idx,
            },
        )
    }

    /// Visit every chunk in order on the current thread. The callback receives the chunk index and the chunk of each
    /// slice; the last chunk may be shorter than `chunk_size`.
    pub fn seq_for_each(mut self, mut cb: impl FnMut(usize, [&mut [T]; N])) {
        let len = self.len();
        let num_chunks = len / self.chunk_size;
        let remainder = len % self.chunk_size;
        let mut base = 0;
        for i in 0..num_chunks {
            let chunks: [&mut [T]; N] = self
                .arrays
                .each_mut()
                .map(|s| &mut s[base..base + self.chunk_size]);
            cb(i + self.start, chunks);

            base += self.chunk_size;
        }
        if remainder != 0 {
            let chunks: [&mut [T]; N] = self
                .arrays
                .each_mut()
                .map(|s| &mut s[base..base + remainder]);
            cb(self.start + num_chunks, chunks);
        }
    }

    fn par_for_each_inner<'b>(
        self,
        num_work_units: usize,
        scope: &rayon::Scope<'b>,
        cb: &'b (impl Fn(usize, [&mut [T]; N]) + Send + Sync),
    ) where
        T: Send,
        'a: 'b,
    {
        let num_total_chunks = self.num_chunks();
        let chunks_per_unit = num_total_chunks / num_work_units;
        let remainder = num_total_chunks % num_work_units;

        let n = if chunks_per_unit == 0 {
            remainder
        } else {
            num_work_units
        };

        let mut rest = self;
        for i in 0..n {
            let mut num_chunks = chunks_per_unit;
            if i < remainder {
                num_chunks += 1;
            }

            if num_chunks == 0 {
                break;
            }

            let (head, tail) = rest.split_at(num_chunks);
            rest = tail;

            scope.spawn(move |_| {
                head.seq_for_each(cb);
            });
        }
    }

    /// Visit every chunk exactly once, spread across the current pool's workers. `chunks_per_task` controls how many
    /// consecutive chunks each spawned task handles; `None` picks a split based on the number of workers.
    pub fn par_for_each(
        self,
        chunks_per_task: Option<usize>,
        cb: impl Fn(usize, [&mut [T]; N]) + Send + Sync,
    ) where
        T: Send,
    {
        let num_threads = rayon::current_num_threads();
        let num_chunks = self.num_chunks();
        if num_chunks == 0 {
            return;
        }

        let num_work_units = match chunks_per_task {
            Some(per_task) => num_chunks.div_ceil(per_task.max(1)),
            None => num_threads * 4,
        };
        trace!("{num_chunks} chunks in {num_work_units} work units on {num_threads} threads");

        if num_threads == 1 || num_work_units <= 1 {
            self.seq_for_each(cb);
        } else {
            rayon::scope(|scope| {
                self.par_for_each_inner(num_work_units, scope, &cb);
            });
        }
    }
}
