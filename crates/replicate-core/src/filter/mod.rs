//! Filter chain
//!
//! Every record a [`Dumper`](crate::Dumper) or [`Loader`](crate::Loader)
//! handles flows through an ordered chain of stages before it counts as
//! delivered. A stage either only observes records, or observes them and
//! also wants a single `finish` call once the session ends:
//!
//! ```rust
//! use replicate_core::filter::{FilterChain, Stage};
//! use replicate_core::{Entry, Record};
//!
//! let mut seen = Vec::new();
//! let mut chain = FilterChain::new();
//! chain.listen(|entry: &Entry<'_>| {
//!     seen.push(entry.record.type_name.clone());
//!     Ok(())
//! });
//! chain
//!     .dispatch(&Entry::new(&Record::new("Thing", 1, Default::default())))
//!     .unwrap();
//! chain.close().unwrap();
//! drop(chain);
//! assert_eq!(seen, vec!["Thing".to_string()]);
//! ```

pub mod stages;

pub use stages::{ProgressLog, RejectTypes, StreamWriter};

use crate::record::{Id, Record};
use crate::{Error, Result};
use std::any::Any;

/// What a stage sees for each record
#[derive(Clone, Copy)]
pub struct Entry<'r> {
    /// The record; on the loader side its references are already translated
    pub record: &'r Record,
    /// Consumer-side id (loader side only)
    pub translated_id: Option<&'r Id>,
    /// Source object when dumping, reconstructed object when loading
    pub object: Option<&'r dyn Any>,
}

impl<'r> Entry<'r> {
    /// Entry carrying only a record
    pub fn new(record: &'r Record) -> Self {
        Self {
            record,
            translated_id: None,
            object: None,
        }
    }

    /// Attach the object the record was produced from or reconstructed into
    pub fn with_object(mut self, object: Option<&'r dyn Any>) -> Self {
        self.object = object;
        self
    }

    /// Attach the consumer-side id
    pub fn with_translated_id(mut self, id: &'r Id) -> Self {
        self.translated_id = Some(id);
        self
    }

    /// Consumer-side id when known, producer-side id otherwise
    pub fn final_id(&self) -> &'r Id {
        self.translated_id.unwrap_or(&self.record.id)
    }

    /// Downcast the attached object
    pub fn object_as<T: Any>(&self) -> Option<&'r T> {
        self.object.and_then(|object| object.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("record", self.record)
            .field("translated_id", &self.translated_id)
            .field("has_object", &self.object.is_some())
            .finish()
    }
}

/// Outcome of observing one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Pass the record on
    Accept,
    /// Veto the record; later stages do not see it
    Reject,
}

/// A stage that observes records
pub trait Filter {
    /// Observe one record
    fn observe(&mut self, entry: &Entry<'_>) -> anyhow::Result<Verdict>;
}

/// A stage that also wants to know when the session ends
pub trait Finish: Filter {
    /// Called once after the last record of the session
    fn finish(&mut self) -> anyhow::Result<()>;
}

struct FnObserver<F>(F);

impl<F> Filter for FnObserver<F>
where
    F: FnMut(&Entry<'_>) -> anyhow::Result<()>,
{
    fn observe(&mut self, entry: &Entry<'_>) -> anyhow::Result<Verdict> {
        (self.0)(entry)?;
        Ok(Verdict::Accept)
    }
}

/// One registered stage
pub enum Stage<'a> {
    /// Observes records only
    Observer(Box<dyn Filter + 'a>),
    /// Observes records and finishes once at close
    Finishing(Box<dyn Finish + 'a>),
}

impl<'a> Stage<'a> {
    /// Wrap a bare observer function; it always accepts
    pub fn observer<F>(f: F) -> Self
    where
        F: FnMut(&Entry<'_>) -> anyhow::Result<()> + 'a,
    {
        Self::Observer(Box::new(FnObserver(f)))
    }

    /// Wrap a stage without a finish hook
    pub fn filter(filter: impl Filter + 'a) -> Self {
        Self::Observer(Box::new(filter))
    }

    /// Wrap a stage with a finish hook
    pub fn finishing(filter: impl Finish + 'a) -> Self {
        Self::Finishing(Box::new(filter))
    }

    /// True if this stage has a finish hook
    pub fn has_finish(&self) -> bool {
        matches!(self, Self::Finishing(_))
    }

    fn observe(&mut self, entry: &Entry<'_>) -> anyhow::Result<Verdict> {
        match self {
            Self::Observer(filter) => filter.observe(entry),
            Self::Finishing(filter) => filter.observe(entry),
        }
    }
}

impl std::fmt::Debug for Stage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observer(_) => f.write_str("Stage::Observer"),
            Self::Finishing(_) => f.write_str("Stage::Finishing"),
        }
    }
}

/// Ordered stages; registration order is invocation order
#[derive(Debug, Default)]
pub struct FilterChain<'a> {
    stages: Vec<Stage<'a>>,
    closed: bool,
}

impl<'a> FilterChain<'a> {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            closed: false,
        }
    }

    /// Append a stage
    pub fn register(&mut self, stage: Stage<'a>) {
        self.stages.push(stage);
    }

    /// Append a bare observer function
    pub fn listen<F>(&mut self, f: F)
    where
        F: FnMut(&Entry<'_>) -> anyhow::Result<()> + 'a,
    {
        self.register(Stage::observer(f));
    }

    /// Run every stage on `entry` in order.
    ///
    /// Stops at the first rejecting stage and returns [`Verdict::Reject`].
    /// A stage error aborts the record and is returned as is.
    pub fn dispatch(&mut self, entry: &Entry<'_>) -> Result<Verdict> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        for (index, stage) in self.stages.iter_mut().enumerate() {
            if stage.observe(entry).map_err(Error::filter)? == Verdict::Reject {
                tracing::debug!(
                    "Stage {} rejected {} {}",
                    index,
                    entry.record.type_name,
                    entry.record.id
                );
                return Ok(Verdict::Reject);
            }
        }
        Ok(Verdict::Accept)
    }

    /// Finish every finishing stage once, in registration order.
    ///
    /// Idempotent: a second call is a no-op. The first finish error stops
    /// the remaining stages and is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for stage in self.stages.iter_mut() {
            if let Stage::Finishing(filter) = stage {
                filter.finish().map_err(Error::filter)?;
            }
        }
        Ok(())
    }

    /// Number of registered stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True if no stage is registered
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// True once `close` has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Attributes;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        verdict: Verdict,
    }

    impl Filter for Recorder {
        fn observe(&mut self, entry: &Entry<'_>) -> anyhow::Result<Verdict> {
            self.log
                .borrow_mut()
                .push(format!("{}:{}", self.name, entry.record.id));
            Ok(self.verdict)
        }
    }

    impl Finish for Recorder {
        fn finish(&mut self) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("{}:finish", self.name));
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &Log, verdict: Verdict) -> Recorder {
        Recorder {
            name,
            log: log.clone(),
            verdict,
        }
    }

    fn record(id: i64) -> Record {
        Record::new("Thing", id, Attributes::new())
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let log: Log = Rc::default();
        let mut chain = FilterChain::new();
        chain.register(Stage::filter(recorder("a", &log, Verdict::Accept)));
        chain.register(Stage::finishing(recorder("b", &log, Verdict::Accept)));
        let bare = log.clone();
        chain.listen(move |entry| {
            bare.borrow_mut().push(format!("c:{}", entry.record.id));
            Ok(())
        });

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.dispatch(&Entry::new(&record(1))).unwrap(), Verdict::Accept);
        assert_eq!(chain.dispatch(&Entry::new(&record(2))).unwrap(), Verdict::Accept);
        chain.close().unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["a:1", "b:1", "c:1", "a:2", "b:2", "c:2", "b:finish"]
        );
    }

    #[test]
    fn test_reject_stops_later_stages() {
        let log: Log = Rc::default();
        let mut chain = FilterChain::new();
        chain.register(Stage::filter(recorder("veto", &log, Verdict::Reject)));
        chain.register(Stage::filter(recorder("late", &log, Verdict::Accept)));

        assert_eq!(chain.dispatch(&Entry::new(&record(1))).unwrap(), Verdict::Reject);
        assert_eq!(*log.borrow(), vec!["veto:1"]);
    }

    #[test]
    fn test_stage_error_propagates_and_stops_dispatch() {
        let log: Log = Rc::default();
        let mut chain = FilterChain::new();
        chain.listen(|_| Err(anyhow::anyhow!("boom")));
        chain.register(Stage::filter(recorder("late", &log, Verdict::Accept)));

        let err = chain.dispatch(&Entry::new(&record(1))).unwrap_err();
        assert!(matches!(err, Error::Filter(_)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_close_finishes_once_without_records() {
        let log: Log = Rc::default();
        let mut chain = FilterChain::new();
        chain.register(Stage::finishing(recorder("a", &log, Verdict::Accept)));
        chain.register(Stage::filter(recorder("b", &log, Verdict::Accept)));
        chain.register(Stage::finishing(recorder("c", &log, Verdict::Accept)));

        chain.close().unwrap();
        chain.close().unwrap();

        assert!(chain.is_closed());
        assert_eq!(*log.borrow(), vec!["a:finish", "c:finish"]);
    }

    struct BrokenFinish;

    impl Filter for BrokenFinish {
        fn observe(&mut self, _entry: &Entry<'_>) -> anyhow::Result<Verdict> {
            Ok(Verdict::Accept)
        }
    }

    impl Finish for BrokenFinish {
        fn finish(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("sink went away")
        }
    }

    #[test]
    fn test_finish_error_stops_later_finishers() {
        let log: Log = Rc::default();
        let mut chain = FilterChain::new();
        chain.register(Stage::finishing(recorder("a", &log, Verdict::Accept)));
        chain.register(Stage::finishing(BrokenFinish));
        chain.register(Stage::finishing(recorder("c", &log, Verdict::Accept)));

        let err = chain.close().unwrap_err();
        assert!(matches!(err, Error::Filter(_)));
        assert!(err.to_string().contains("sink went away"));
        assert_eq!(*log.borrow(), vec!["a:finish"]);

        // already closed; the skipped finisher is not retried
        chain.close().unwrap();
        assert_eq!(*log.borrow(), vec!["a:finish"]);
    }

    #[test]
    fn test_dispatch_after_close_fails() {
        let mut chain = FilterChain::new();
        chain.close().unwrap();
        let err = chain.dispatch(&Entry::new(&record(1))).unwrap_err();
        assert!(matches!(err, Error::SessionClosed));
    }

    #[test]
    fn test_entry_object_downcast() {
        let rec = record(5);
        let object = String::from("payload");
        let translated = Id::Int(50);
        let entry = Entry::new(&rec)
            .with_object(Some(&object))
            .with_translated_id(&translated);

        assert_eq!(entry.object_as::<String>().map(String::as_str), Some("payload"));
        assert!(entry.object_as::<i64>().is_none());
        assert_eq!(entry.final_id(), &Id::Int(50));
        assert_eq!(Entry::new(&rec).final_id(), &Id::Int(5));
    }
}
