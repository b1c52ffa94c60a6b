//! Dumper: walks application objects and emits records
//!
//! Objects describe themselves through [`Replicant`]. A replicant may dump
//! the objects it references before writing itself, so a stream produced
//! this way always lists referenced records first. Each `(type, id)` is
//! emitted at most once per dumper. Objects that provide a
//! [`key`](Replicant::key) are claimed while their `dump_replicant` runs, so
//! a cycle back to an object still being dumped stops instead of recursing.

use crate::config::ReplicateConfig;
use crate::filter::{Entry, FilterChain, ProgressLog, Stage, Verdict};
use crate::protocol::RecordWriter;
use crate::record::{Id, Record};
use crate::stats::Stats;
use crate::{Error, Result};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::io::Write;

/// Per-object serialization capability
pub trait Replicant: Any {
    /// Describe this object as a record
    fn describe(&self) -> Result<Record>;

    /// `(type, id)` known without building attributes.
    ///
    /// When provided, the dumper skips objects it already emitted, or is
    /// still dumping further up the stack, before calling
    /// [`dump_replicant`](Self::dump_replicant). Replicants that can reach
    /// themselves through their references must provide it.
    fn key(&self) -> Option<(String, Id)> {
        None
    }

    /// Emit this object, and anything it references, into `dumper`
    fn dump_replicant(&self, dumper: &mut Dumper<'_>) -> Result<()>
    where
        Self: Sized,
    {
        let record = self.describe()?;
        dumper.write(record, Some(self))?;
        Ok(())
    }
}

/// Producer side of a replication session
pub struct Dumper<'a> {
    chain: FilterChain<'a>,
    output: Option<RecordWriter<Box<dyn Write + 'a>>>,
    memo: HashMap<String, HashSet<Id>>,
    in_progress: HashSet<(String, Id)>,
    stats: Stats,
    config: ReplicateConfig,
}

impl<'a> Dumper<'a> {
    /// Dumper without stream output; records only reach the filter chain
    pub fn new() -> Self {
        Self::with_config(ReplicateConfig::default())
    }

    /// Dumper with explicit configuration
    pub fn with_config(config: ReplicateConfig) -> Self {
        Self {
            chain: FilterChain::new(),
            output: None,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            stats: Stats::new(),
            config,
        }
    }

    /// Dumper that encodes accepted records onto `writer`
    pub fn to_writer(writer: impl Write + 'a) -> Self {
        Self::new().with_output(writer)
    }

    /// Encode accepted records onto `writer`
    pub fn with_output(mut self, writer: impl Write + 'a) -> Self {
        self.output = Some(RecordWriter::new(Box::new(writer)));
        self
    }

    /// Run `f` against a new dumper and close it on every exit path.
    ///
    /// The closure's error wins over a close error; the latter is logged.
    pub fn session<T, F>(writer: impl Write + 'a, f: F) -> Result<T>
    where
        F: FnOnce(&mut Dumper<'a>) -> Result<T>,
    {
        let mut guard = DumperGuard(Dumper::to_writer(writer));
        let outcome = f(&mut guard.0);
        let closed = guard.0.close();
        finish_session(outcome, closed)
    }

    /// Configuration in effect
    pub fn config(&self) -> &ReplicateConfig {
        &self.config
    }

    /// Register a stage
    pub fn register(&mut self, stage: Stage<'a>) {
        self.chain.register(stage);
    }

    /// Register a bare observer function
    pub fn listen<F>(&mut self, f: F)
    where
        F: FnMut(&Entry<'_>) -> anyhow::Result<()> + 'a,
    {
        self.chain.listen(f);
    }

    /// Log progress through a [`ProgressLog`] stage at the configured interval
    pub fn log_progress(&mut self) {
        let progress = ProgressLog::new("dump", self.config.progress_interval);
        self.register(Stage::finishing(progress));
    }

    /// Dump one root object and whatever it pulls in
    pub fn dump<R: Replicant>(&mut self, object: &R) -> Result<()> {
        let Some(key) = object.key() else {
            return object.dump_replicant(self);
        };
        if self.is_dumped(&key.0, &key.1) || self.in_progress.contains(&key) {
            tracing::trace!("Skipping already dumped {} {}", key.0, key.1);
            return Ok(());
        }
        self.in_progress.insert(key.clone());
        let outcome = object.dump_replicant(self);
        self.in_progress.remove(&key);
        outcome
    }

    /// Dump every object of `objects` in order
    pub fn dump_all<'o, R, I>(&mut self, objects: I) -> Result<()>
    where
        R: Replicant + 'o,
        I: IntoIterator<Item = &'o R>,
    {
        for object in objects {
            self.dump(object)?;
        }
        Ok(())
    }

    /// Emit one record.
    ///
    /// Returns `false` when the record was skipped: already emitted by this
    /// dumper, or rejected by a stage. Only accepted records are encoded to
    /// the output and counted. A record is remembered only once a stage
    /// rejected it or it was fully emitted; after an error it can be written
    /// again.
    pub fn write(&mut self, record: Record, object: Option<&dyn Any>) -> Result<bool> {
        if self.chain.is_closed() {
            return Err(Error::SessionClosed);
        }
        if self.is_dumped(&record.type_name, &record.id) {
            return Ok(false);
        }

        let entry = Entry::new(&record).with_object(object);
        if self.chain.dispatch(&entry)? == Verdict::Reject {
            self.remember(&record);
            return Ok(false);
        }

        if let Some(output) = self.output.as_mut() {
            output.write(&record)?;
        }
        self.remember(&record);
        self.stats.increment(&record.type_name);
        tracing::debug!("Dumped {} {}", record.type_name, record.id);
        Ok(true)
    }

    fn remember(&mut self, record: &Record) {
        self.memo
            .entry(record.type_name.clone())
            .or_default()
            .insert(record.id.clone());
    }

    /// True if `(type, id)` was emitted or rejected by [`write`](Self::write)
    pub fn is_dumped(&self, type_name: &str, id: &Id) -> bool {
        self.memo
            .get(type_name)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Records dumped per type
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Flush the output and finish every stage; idempotent
    pub fn close(&mut self) -> Result<()> {
        if self.chain.is_closed() {
            return Ok(());
        }
        if let Some(output) = self.output.as_mut() {
            output.flush()?;
        }
        self.chain.close()?;
        tracing::info!(
            "Dump complete: {} records ({})",
            self.stats.total(),
            self.stats
        );
        Ok(())
    }
}

impl Default for Dumper<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Closes the dumper if the session closure unwinds
struct DumperGuard<'a>(Dumper<'a>);

impl Drop for DumperGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            tracing::warn!("Failed to close dumper: {}", e);
        }
    }
}

/// Merge a session body's outcome with the result of closing it
pub(crate) fn finish_session<T>(outcome: Result<T>, closed: Result<()>) -> Result<T> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!("Close failed after session error: {}", close_err);
            Err(e)
        }
    }
}
