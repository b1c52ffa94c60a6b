//! Built-in stages

use super::{Entry, Filter, Finish, Verdict};
use crate::protocol::RecordWriter;
use crate::stats::Stats;
use std::collections::HashSet;
use std::io::Write;

/// Logs progress every `interval` records and a summary at finish
#[derive(Debug)]
pub struct ProgressLog {
    label: String,
    interval: u64,
    seen: Stats,
}

impl ProgressLog {
    /// Create a progress logger; an interval of 0 only logs the summary
    pub fn new(label: impl Into<String>, interval: u64) -> Self {
        Self {
            label: label.into(),
            interval,
            seen: Stats::new(),
        }
    }

    /// Records observed so far
    pub fn seen(&self) -> &Stats {
        &self.seen
    }
}

impl Filter for ProgressLog {
    fn observe(&mut self, entry: &Entry<'_>) -> anyhow::Result<Verdict> {
        self.seen.increment(&entry.record.type_name);
        let total = self.seen.total();
        if self.interval > 0 && total % self.interval == 0 {
            tracing::info!("{}: {} records ({})", self.label, total, self.seen);
        }
        Ok(Verdict::Accept)
    }
}

impl Finish for ProgressLog {
    fn finish(&mut self) -> anyhow::Result<()> {
        tracing::info!(
            "{}: complete, {} records ({})",
            self.label,
            self.seen.total(),
            self.seen
        );
        Ok(())
    }
}

/// Vetoes every record whose type is in the deny set
#[derive(Debug, Default)]
pub struct RejectTypes {
    types: HashSet<String>,
}

impl RejectTypes {
    /// Reject the given types
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }
}

impl Filter for RejectTypes {
    fn observe(&mut self, entry: &Entry<'_>) -> anyhow::Result<Verdict> {
        if self.types.contains(&entry.record.type_name) {
            Ok(Verdict::Reject)
        } else {
            Ok(Verdict::Accept)
        }
    }
}

/// Encodes every observed record onto a writer, flushing at finish.
///
/// On a loader chain this re-emits the stream with references already
/// translated to consumer ids.
pub struct StreamWriter<W: Write> {
    writer: RecordWriter<W>,
}

impl<W: Write> StreamWriter<W> {
    /// Write records to `inner`
    pub fn new(inner: W) -> Self {
        Self {
            writer: RecordWriter::new(inner),
        }
    }
}

impl<W: Write> Filter for StreamWriter<W> {
    fn observe(&mut self, entry: &Entry<'_>) -> anyhow::Result<Verdict> {
        self.writer.write(entry.record)?;
        Ok(Verdict::Accept)
    }
}

impl<W: Write> Finish for StreamWriter<W> {
    fn finish(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        tracing::debug!("Stream writer flushed {} records", self.writer.records_written());
        Ok(())
    }
}
