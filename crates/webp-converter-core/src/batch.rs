//! Batch conversion with per-item failure isolation.
//!
//! Every input yields at least one entry in the [`BatchResult`]: missing
//! paths, denied or unreadable directories and special files become
//! failures, directories are expanded (non-recursively) into one entry per
//! eligible image. No single failure stops the batch.

use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::hash_map::{Entry, HashMap};
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::codec::{ImageCodec, WebpCodec};
use crate::conversion::{panic_message, ConversionEngine};
use crate::discovery::list_images;
use crate::error::Error;
use crate::types::{BatchResult, ConversionOptions, ConversionRequest, ConversionResult};

/// Message for inputs that are missing from the filesystem
pub const MISSING_INPUT: &str = "file does not exist";

/// Message for inputs that are neither regular files nor directories
pub const SPECIAL_INPUT: &str = "not a regular file or directory";

/// Work items tagged with their position in the expanded list
type WorkGroup = Vec<(usize, WorkItem)>;

/// One unit of work produced by expanding an input path
#[derive(Debug)]
enum WorkItem {
    /// Convert this file
    Convert(PathBuf),
    /// Already resolved to a failure during expansion
    Done(ConversionResult),
}

/// Runs a [`ConversionEngine`] over many inputs
pub struct BatchCoordinator<C = WebpCodec> {
    engine: ConversionEngine<C>,
    pool: Option<rayon::ThreadPool>,
}

impl<C: ImageCodec> BatchCoordinator<C> {
    /// Create a coordinator converting strictly sequentially
    pub fn new(engine: ConversionEngine<C>) -> Self {
        Self { engine, pool: None }
    }

    /// Convert on a bounded pool of `workers` threads (0 = one per CPU,
    /// 1 = sequential). Results keep expansion order.
    pub fn with_workers(mut self, workers: usize) -> Self {
        let workers = if workers == 0 { num_cpus::get() } else { workers };

        self.pool = if workers > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("webp-batch-{}", i))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Failed to build worker pool ({}), converting sequentially", e);
                    None
                }
            }
        } else {
            None
        };

        self
    }

    pub fn engine(&self) -> &ConversionEngine<C> {
        &self.engine
    }

    /// Number of conversions that may run at once
    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(1)
    }

    /// Convert every input, expanding directories, and collect one result per
    /// concrete file in input order.
    pub fn run<P: AsRef<Path>>(&self, paths: &[P], options: ConversionOptions) -> BatchResult {
        info!("Starting batch of {} inputs with {} worker(s)", paths.len(), self.workers());

        let results: Vec<ConversionResult> = match &self.pool {
            None => {
                // Expand lazily so each input sees the effects of the previous ones
                let mut results = Vec::with_capacity(paths.len());
                for path in paths {
                    for item in self.expand(path.as_ref()) {
                        results.push(self.process(item, options));
                    }
                }
                results
            }
            Some(pool) => {
                let items: Vec<WorkItem> = paths
                    .iter()
                    .flat_map(|path| self.expand(path.as_ref()))
                    .collect();
                // Items writing the same output run in order within one task
                let groups = self.group_by_output(items);
                let mut indexed: Vec<(usize, ConversionResult)> = pool.install(|| {
                    groups
                        .into_par_iter()
                        .flat_map_iter(|group| {
                            group
                                .into_iter()
                                .map(|(index, item)| (index, self.process(item, options)))
                                .collect::<Vec<_>>()
                        })
                        .collect()
                });
                indexed.sort_by_key(|(index, _)| *index);
                indexed.into_iter().map(|(_, result)| result).collect()
            }
        };

        let batch = BatchResult::from(results);
        info!(
            "Batch complete: {} succeeded, {} failed",
            batch.succeeded(),
            batch.failed()
        );
        batch
    }

    /// Turn one input into work items. Never fails.
    fn expand(&self, path: &Path) -> Vec<WorkItem> {
        let guard = self.engine.guard();
        let resolved = guard.resolve(path);

        let metadata = match fs::metadata(&resolved) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return vec![WorkItem::Done(ConversionResult::failure(path, MISSING_INPUT))];
            }
            Err(e) => {
                return vec![WorkItem::Done(ConversionResult::failure(path, Error::Io(e)))];
            }
        };

        if metadata.is_file() {
            return vec![WorkItem::Convert(path.to_path_buf())];
        }

        if !metadata.is_dir() {
            return vec![WorkItem::Done(ConversionResult::failure(path, SPECIAL_INPUT))];
        }

        // Directories outside the roots are never enumerated
        if !guard.is_allowed(&resolved) {
            return vec![WorkItem::Done(ConversionResult::failure(
                path,
                Error::AccessDenied(resolved),
            ))];
        }

        let expansion = list_images(&resolved);
        if let Some(diagnostic) = expansion.diagnostic {
            return vec![WorkItem::Done(ConversionResult::failure(path, diagnostic))];
        }

        debug!("Expanded {} into {} images", path.display(), expansion.images.len());
        expansion.images.into_iter().map(WorkItem::Convert).collect()
    }

    /// Group work by output path so no two groups write the same file,
    /// keeping each item's expansion index. Failures form their own groups.
    fn group_by_output(&self, items: Vec<WorkItem>) -> Vec<WorkGroup> {
        let mut groups: Vec<WorkGroup> = Vec::new();
        let mut by_output: HashMap<PathBuf, usize> = HashMap::new();

        for (index, item) in items.into_iter().enumerate() {
            let output = match &item {
                WorkItem::Convert(path) => {
                    let resolved = self.engine.guard().resolve(path);
                    Some(self.engine.output_path_for(&resolved))
                }
                WorkItem::Done(_) => None,
            };

            match output.map(|output| by_output.entry(output)) {
                Some(Entry::Occupied(slot)) => {
                    debug!("Output collision, converting in order: {:?}", slot.key());
                    groups[*slot.get()].push((index, item));
                }
                Some(Entry::Vacant(slot)) => {
                    slot.insert(groups.len());
                    groups.push(vec![(index, item)]);
                }
                None => groups.push(vec![(index, item)]),
            }
        }

        groups
    }

    fn process(&self, item: WorkItem, options: ConversionOptions) -> ConversionResult {
        match item {
            WorkItem::Done(result) => result,
            WorkItem::Convert(path) => {
                let request = ConversionRequest::new(&path, options);
                panic::catch_unwind(AssertUnwindSafe(|| self.engine.convert(&request)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(&*payload);
                        warn!("Conversion of {} panicked: {}", path.display(), message);
                        ConversionResult::failure(&path, format!("conversion panicked: {}", message))
                    })
            }
        }
    }
}
