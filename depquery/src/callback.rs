//! Component H — Batch Streaming Callback.
//!
//! Deduplicates targets on the fly with a shared Label-keyed uniquifier
//! and flushes to the downstream sink in fixed-size batches (§4.H). The
//! mutex guards buffer and uniquifier together, the simpler of the two
//! disciplines §5 sanctions for concurrent producers.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::QueryError;
use crate::model::{Label, Target};

/// The downstream consumer. Must tolerate concurrent calls to `process`
/// (§6) — in practice this crate only ever calls it while holding the
/// callback's own lock, so a plain sink implementation doesn't need its
/// own synchronization, but the trait bound still requires `Send + Sync`
/// so it can be shared across resolver worker tasks.
pub trait Sink: Send + Sync {
    fn process(&self, targets: Vec<Target>) -> anyhow::Result<()>;
}

impl<F: Fn(Vec<Target>) -> anyhow::Result<()> + Send + Sync> Sink for F {
    fn process(&self, targets: Vec<Target>) -> anyhow::Result<()> {
        self(targets)
    }
}

struct State {
    buffer: Vec<Target>,
    seen: HashSet<Label>,
    flushed: bool,
    total: usize,
}

pub struct BatchStreamingCallback {
    sink: Arc<dyn Sink>,
    threshold: usize,
    state: Mutex<State>,
}

impl BatchStreamingCallback {
    pub fn new(sink: Arc<dyn Sink>, threshold: usize) -> Self {
        Self {
            sink,
            threshold,
            state: Mutex::new(State {
                buffer: Vec::new(),
                seen: HashSet::new(),
                flushed: false,
                total: 0,
            }),
        }
    }

    /// Number of distinct Labels forwarded (or buffered) so far. The
    /// driver uses this after `flush()` to decide step 6's "was any
    /// partial result non-empty" outcome.
    pub fn emitted_count(&self) -> usize {
        self.state.lock().total
    }

    /// Buffers `targets`, deduplicated by `Label`, flushing to the
    /// downstream sink whenever the buffer reaches `threshold`.
    pub fn process(&self, targets: impl IntoIterator<Item = Target>) -> anyhow::Result<()> {
        let ready = {
            let mut state = self.state.lock();
            if state.flushed {
                return Err(QueryError::CallbackAlreadyFlushed.into());
            }
            for target in targets {
                if state.seen.insert(target.label().clone()) {
                    state.total += 1;
                    state.buffer.push(target);
                }
            }
            if state.buffer.len() >= self.threshold {
                Some(std::mem::take(&mut state.buffer))
            } else {
                None
            }
        };
        if let Some(batch) = ready {
            self.sink.process(batch)?;
        }
        Ok(())
    }

    /// Forwards any residue and marks the callback unreusable: subsequent
    /// `process` calls return `QueryError::CallbackAlreadyFlushed`.
    pub fn flush(&self) -> anyhow::Result<()> {
        let residue = {
            let mut state = self.state.lock();
            state.flushed = true;
            std::mem::take(&mut state.buffer)
        };
        if !residue.is_empty() {
            self.sink.process(residue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as StdMutex;

    fn label(name: &str) -> Label {
        Label::new("", "a", name)
    }

    fn target(name: &str) -> Target {
        Target::SourceFile(label(name))
    }

    #[test]
    fn deduplicates_across_process_calls() {
        let received: Arc<StdMutex<Vec<Target>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink_received = received.clone();
        let sink = move |batch: Vec<Target>| {
            sink_received.lock().extend(batch);
            Ok(())
        };
        let callback = BatchStreamingCallback::new(Arc::new(sink), 2);

        callback.process(vec![target("x"), target("y")]).unwrap();
        callback.process(vec![target("y"), target("z")]).unwrap();
        callback.flush().unwrap();

        let got = received.lock();
        let mut names: Vec<String> = got.iter().map(|t| t.label().target_name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn flushes_at_threshold_then_flush_sends_residue() {
        let flush_calls: Arc<StdMutex<Vec<usize>>> = Arc::new(StdMutex::new(Vec::new()));
        let calls = flush_calls.clone();
        let sink = move |batch: Vec<Target>| {
            calls.lock().push(batch.len());
            Ok(())
        };
        let callback = BatchStreamingCallback::new(Arc::new(sink), 2);

        callback.process(vec![target("a"), target("b"), target("c")]).unwrap();
        assert_eq!(*flush_calls.lock(), vec![3]);

        callback.process(vec![target("d")]).unwrap();
        callback.flush().unwrap();
        assert_eq!(*flush_calls.lock(), vec![3, 1]);
    }

    #[test]
    fn process_after_flush_fails() {
        let callback = BatchStreamingCallback::new(Arc::new(|_: Vec<Target>| Ok(())), 10);
        callback.flush().unwrap();
        let err = callback.process(vec![target("x")]).unwrap_err();
        assert!(err.to_string().contains("already flushed"));
    }
}
