//! Loader: rebuilds objects from a record stream
//!
//! Each fed record goes through the same steps, in order:
//!
//! 1. reference markers in its attributes are translated through the
//!    loader's [`TranslationTable`] (missing targets are fatal);
//! 2. the record type's [`Reconstruct`](crate::Reconstruct) capability
//!    builds the consumer object;
//! 3. `(type, producer id) -> consumer id` is recorded;
//! 4. the translated record and its object are dispatched to the stages;
//! 5. the per-type counter is bumped.
//!
//! With [`ignore_missing`](Loader::ignore_missing) active, a record whose
//! type has no capability skips step 2 and maps its id to itself so later
//! references to it still resolve.

use crate::config::ReplicateConfig;
use crate::dumper::finish_session;
use crate::filter::{Entry, FilterChain, ProgressLog, Stage};
use crate::protocol::RecordReader;
use crate::record::{Attributes, Id, Record, Value};
use crate::registry::TypeRegistry;
use crate::stats::Stats;
use crate::translation::TranslationTable;
use crate::{Error, Result};
use std::any::Any;
use std::io::Read;

/// Consumer side of a replication session
pub struct Loader<'a> {
    registry: TypeRegistry<'a>,
    chain: FilterChain<'a>,
    translations: TranslationTable,
    stats: Stats,
    ignore_missing: bool,
    config: ReplicateConfig,
}

impl<'a> Loader<'a> {
    /// Create a loader reconstructing through `registry`
    pub fn new(registry: TypeRegistry<'a>) -> Self {
        Self::with_config(registry, ReplicateConfig::default())
    }

    /// Create a loader with explicit configuration
    pub fn with_config(registry: TypeRegistry<'a>, config: ReplicateConfig) -> Self {
        Self {
            registry,
            chain: FilterChain::new(),
            translations: TranslationTable::new(),
            stats: Stats::new(),
            ignore_missing: config.ignore_missing,
            config,
        }
    }

    /// Run `f` against a new loader and close it on every exit path.
    ///
    /// The stages' `finish` hooks run before this returns, whether `f`
    /// succeeded, failed or panicked. The closure's error wins over a close
    /// error; the latter is logged.
    pub fn session<T, F>(registry: TypeRegistry<'a>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Loader<'a>) -> Result<T>,
    {
        Self::session_with_config(registry, ReplicateConfig::default(), f)
    }

    /// [`session`](Self::session) with explicit configuration
    pub fn session_with_config<T, F>(
        registry: TypeRegistry<'a>,
        config: ReplicateConfig,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Loader<'a>) -> Result<T>,
    {
        let mut guard = LoaderGuard(Loader::with_config(registry, config));
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
        let progress = ProgressLog::new("load", self.config.progress_interval);
        self.register(Stage::finishing(progress));
    }

    /// Tolerate records whose type has no reconstruction capability.
    ///
    /// One-way: there is no way to turn it back off. Missing reference
    /// targets stay fatal.
    pub fn ignore_missing(&mut self) {
        if !self.ignore_missing {
            tracing::debug!("Loader now ignores unresolvable types");
        }
        self.ignore_missing = true;
    }

    /// True once [`ignore_missing`](Self::ignore_missing) was called
    pub fn is_ignoring_missing(&self) -> bool {
        self.ignore_missing
    }

    /// Load one record; returns the consumer-side id
    pub fn feed(
        &mut self,
        type_name: impl Into<String>,
        id: impl Into<Id>,
        attributes: Attributes,
    ) -> Result<Id> {
        self.feed_record(Record::new(type_name, id, attributes))
    }

    /// Load one record; returns the consumer-side id.
    ///
    /// A stage rejecting the record only stops later stages. The object is
    /// already built by then, so the record keeps its translation and is
    /// still counted in [`stats`](Self::stats), unlike the dumper, which
    /// counts only what it emitted.
    pub fn feed_record(&mut self, record: Record) -> Result<Id> {
        if self.chain.is_closed() {
            return Err(Error::SessionClosed);
        }
        let Record {
            type_name,
            id,
            attributes,
        } = record;

        let attributes = self.translate(attributes)?;

        let built = match self.registry.reconstruct(&type_name, &id, &attributes) {
            Ok(built) => Some(built),
            Err(e) if e.is_unresolvable_type() && self.ignore_missing => {
                tracing::warn!("Skipping {} {}: {}", type_name, id, e);
                None
            }
            Err(e) => return Err(e),
        };
        let final_id = match &built {
            Some(built) => built.id.clone(),
            None => id.clone(),
        };

        if let Some(previous) = self
            .translations
            .insert(&type_name, id.clone(), final_id.clone())
        {
            tracing::debug!(
                "Replayed {} {}: {} replaces {}",
                type_name,
                id,
                final_id,
                previous
            );
        }

        let record = Record {
            type_name,
            id,
            attributes,
        };
        let object: Option<&dyn Any> = built.as_ref().map(|built| &*built.object);
        let entry = Entry::new(&record)
            .with_translated_id(&final_id)
            .with_object(object);
        self.chain.dispatch(&entry)?;

        self.stats.increment(&record.type_name);
        tracing::debug!("Loaded {} {} as {}", record.type_name, record.id, final_id);
        Ok(final_id)
    }

    /// Feed every record of `stream` until end of input or the first error.
    ///
    /// Returns the number of records fed.
    pub fn read<R: Read>(&mut self, stream: R) -> Result<u64> {
        let reader = RecordReader::with_max_frame_len(stream, self.config.max_frame_len);
        let mut fed = 0;
        for record in reader {
            self.feed_record(record?)?;
            fed += 1;
        }
        tracing::debug!("Read {} records from stream", fed);
        Ok(fed)
    }

    fn translate(&self, attributes: Attributes) -> Result<Attributes> {
        if attributes.values().any(Value::has_references) {
            self.translations.rewrite(&attributes)
        } else {
            Ok(attributes)
        }
    }

    /// Records loaded per type
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Identifier translations accumulated so far
    pub fn translations(&self) -> &TranslationTable {
        &self.translations
    }

    /// Reconstruction capabilities
    pub fn registry(&self) -> &TypeRegistry<'a> {
        &self.registry
    }

    /// Mutable access to the reconstruction capabilities
    pub fn registry_mut(&mut self) -> &mut TypeRegistry<'a> {
        &mut self.registry
    }

    /// True once [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.chain.is_closed()
    }

    /// Finish every stage; idempotent
    pub fn close(&mut self) -> Result<()> {
        if self.chain.is_closed() {
            return Ok(());
        }
        self.chain.close()?;
        tracing::info!(
            "Load complete: {} records ({})",
            self.stats.total(),
            self.stats
        );
        Ok(())
    }
}

/// Closes the loader if the session closure unwinds
struct LoaderGuard<'a>(Loader<'a>);

impl Drop for LoaderGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            tracing::warn!("Failed to close loader: {}", e);
        }
    }
}
