//! Registry of processes for the live height window

use super::{Process, ProcessDeps};
use crate::domain::{BlockVerifyError, BlockVerifyResult};
use crate::recovery::RecoveredBlock;
use parking_lot::Mutex;
use shared_types::{short_hex, Hash};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Processes keyed by height, for heights `[current, current + look_ahead]`.
///
/// The registry lock is never held while a process lock is taken.
pub struct ProcessManager {
    deps: Arc<ProcessDeps>,
    inner: Mutex<ManagerInner>,
}

struct ManagerInner {
    current: u64,
    super_seq: u64,
    processes: HashMap<u64, Arc<Process>>,
    /// Restored requests waiting for their height to become current.
    pending: HashMap<Hash, RecoveredBlock>,
}

impl ProcessManager {
    pub fn new(deps: Arc<ProcessDeps>) -> Self {
        Self {
            deps,
            inner: Mutex::new(ManagerInner {
                current: 0,
                super_seq: 0,
                processes: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    pub fn current_number(&self) -> u64 {
        self.inner.lock().current
    }

    pub fn super_seq(&self) -> u64 {
        self.inner.lock().super_seq
    }

    /// Move the window to `number`, closing every process below it.
    ///
    /// Positions order by super-block sequence first, then height. A higher
    /// sequence closes every process and may move the height backwards.
    pub fn set_current_number(&self, number: u64, super_seq: u64) {
        let (evicted, ready) = {
            let mut inner = self.inner.lock();
            if (super_seq, number) < (inner.super_seq, inner.current) {
                debug!(
                    number,
                    super_seq,
                    current = inner.current,
                    current_super_seq = inner.super_seq,
                    "Ignoring lower chain position"
                );
                return;
            }
            let reset = super_seq > inner.super_seq;
            if reset {
                info!(
                    super_seq,
                    previous = inner.super_seq,
                    number,
                    "Super block sequence advanced, closing every process"
                );
            }
            inner.super_seq = super_seq;
            inner.current = number;

            let stale: Vec<u64> = inner
                .processes
                .keys()
                .copied()
                .filter(|height| reset || *height < number)
                .collect();
            let evicted: Vec<Arc<Process>> = stale
                .iter()
                .filter_map(|height| inner.processes.remove(height))
                .collect();

            (evicted, Self::take_pending(&mut inner))
        };

        for process in evicted {
            process.close();
        }
        if !ready.is_empty() {
            match self.process(number) {
                Ok(process) => {
                    for block in ready {
                        inject(&process, block);
                    }
                }
                Err(e) => warn!(number, error = %e, "Current process unavailable for restored blocks"),
            }
        }
    }

    /// Drop pending blocks at or below the current height, returning those
    /// exactly at it.
    fn take_pending(inner: &mut ManagerInner) -> Vec<RecoveredBlock> {
        let current = inner.current;
        let due: Vec<Hash> = inner
            .pending
            .iter()
            .filter(|(_, block)| block.request.number() <= current)
            .map(|(hash, _)| *hash)
            .collect();

        due.iter()
            .filter_map(|hash| inner.pending.remove(hash))
            .filter(|block| {
                let keep = block.request.number() == current;
                if !keep {
                    debug!(height = block.request.number(), "Dropping outdated restored block");
                }
                keep
            })
            .collect()
    }

    /// Process for `height`, created on first use.
    pub fn process(&self, height: u64) -> BlockVerifyResult<Arc<Process>> {
        let mut inner = self.inner.lock();
        let current = inner.current;
        if height < current {
            return Err(BlockVerifyError::HeightTooLow {
                number: height,
                current,
            });
        }
        if height > current.saturating_add(self.deps.config.look_ahead) {
            return Err(BlockVerifyError::HeightTooHigh {
                number: height,
                current,
            });
        }

        let process = inner
            .processes
            .entry(height)
            .or_insert_with(|| Process::new(height, Arc::clone(&self.deps)));
        Ok(Arc::clone(process))
    }

    pub fn current_process(&self) -> BlockVerifyResult<Arc<Process>> {
        let current = self.current_number();
        self.process(current)
    }

    /// Hand a restored block to the current process, or hold it until its
    /// height becomes current.
    pub fn add_verified_block(&self, block: RecoveredBlock) {
        let height = block.request.number();
        let current = {
            let mut inner = self.inner.lock();
            if height > inner.current {
                debug!(height, hash = %short_hex(&block.hash), "Holding restored block");
                inner.pending.insert(block.hash, block);
                return;
            }
            inner.current
        };

        if height < current {
            debug!(height, current, "Dropping outdated restored block");
            return;
        }
        match self.process(height) {
            Ok(process) => inject(&process, block),
            Err(e) => warn!(height, error = %e, "Process unavailable for restored block"),
        }
    }

    /// Close and forget every process.
    pub fn clear(&self) {
        let processes: Vec<Arc<Process>> = {
            let mut inner = self.inner.lock();
            inner.pending.clear();
            inner.processes.drain().map(|(_, p)| p).collect()
        };
        for process in &processes {
            process.close();
        }
        info!(closed = processes.len(), "Process registry cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().processes.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

fn inject(process: &Process, block: RecoveredBlock) {
    let hash = block.hash;
    if let Err(e) = process.add_verified_block(block) {
        debug!(height = process.number(), hash = %short_hex(&hash), error = %e, "Restored block not added");
    }
}
