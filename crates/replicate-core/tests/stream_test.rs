//! End-to-end dump and load through encoded streams

use replicate_core::filter::{ProgressLog, RejectTypes, StreamWriter};
use replicate_core::object::{ObjectType, ReplicantObject};
use replicate_core::{
    Attributes, Dumper, Error, Id, Loader, Record, Reference, ReplicateConfig, Replicant, Stage,
    TypeRegistry, Value, protocol,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::rc::Rc;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Author {
    id: i64,
    name: String,
}

impl Replicant for Author {
    fn describe(&self) -> replicate_core::Result<Record> {
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), Value::Str(self.name.clone()));
        Ok(Record::new("Author", self.id, attrs))
    }

    fn key(&self) -> Option<(String, Id)> {
        Some(("Author".into(), Id::Int(self.id)))
    }
}

struct Book {
    id: i64,
    title: String,
    authors: Vec<Author>,
}

impl Replicant for Book {
    fn describe(&self) -> replicate_core::Result<Record> {
        let mut attrs = Attributes::new();
        attrs.insert("title".into(), Value::Str(self.title.clone()));
        attrs.insert(
            "authors".into(),
            Reference::many("Author", self.authors.iter().map(|a| a.id)).into(),
        );
        if let Some(first) = self.authors.first() {
            attrs.insert("lead".into(), Reference::one("Author", first.id).into());
        }
        Ok(Record::new("Book", self.id, attrs))
    }

    fn dump_replicant(&self, dumper: &mut Dumper<'_>) -> replicate_core::Result<()> {
        dumper.dump_all(&self.authors)?;
        dumper.write(self.describe()?, Some(self))?;
        Ok(())
    }
}

fn library() -> Vec<Book> {
    let author = |id: i64, name: &str| Author {
        id,
        name: name.to_string(),
    };
    vec![
        Book {
            id: 1,
            title: "Systems".into(),
            authors: vec![author(10, "ann"), author(11, "bob")],
        },
        Book {
            id: 2,
            title: "Streams".into(),
            authors: vec![author(11, "bob"), author(12, "cy")],
        },
    ]
}

fn dump_library(path: &std::path::Path) -> replicate_core::Stats {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut dumper = Dumper::to_writer(file);
    dumper.log_progress();
    dumper.dump_all(&library()).unwrap();
    dumper.close().unwrap();
    dumper.stats().clone()
}

fn registry() -> (TypeRegistry<'static>, replicate_core::object::ObjectStore) {
    let books = ObjectType::starting_at("Book", 9_000);
    let store = books.store();
    let registry = TypeRegistry::new()
        .with("Author", ObjectType::starting_at("Author", 500))
        .with("Book", books);
    (registry, store)
}

#[test]
fn test_dump_and_load_through_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("library.replicate");

    let dumped = dump_library(&path);
    assert_eq!(dumped.get("Author"), 3);
    assert_eq!(dumped.get("Book"), 2);

    let (registry, books) = registry();
    let stats = Loader::session(registry, |loader| {
        loader.log_progress();
        loader.read(BufReader::new(File::open(&path)?))?;
        Ok(loader.stats().clone())
    })
    .unwrap();

    assert_eq!(stats, dumped);

    // authors were loaded as 500 (ann), 501 (bob), 502 (cy)
    let books = books.borrow();
    assert_eq!(books.len(), 2);
    assert_eq!(
        books[0].get("authors"),
        Some(&Value::List(vec![
            Value::Id(Id::Int(500)),
            Value::Id(Id::Int(501)),
        ]))
    );
    assert_eq!(books[0].get("lead"), Some(&Value::Id(Id::Int(500))));
    assert_eq!(
        books[1].get("authors"),
        Some(&Value::List(vec![
            Value::Id(Id::Int(501)),
            Value::Id(Id::Int(502)),
        ]))
    );
    assert_eq!(books[1].get("title"), Some(&Value::Str("Streams".into())));
}

#[test]
fn test_corrupt_tail_stops_read() {
    let mut data = Vec::new();
    Dumper::session(&mut data, |dumper| dumper.dump_all(&library())).unwrap();
    data.extend_from_slice(&[0x01, 0x00, 0x00]);

    let (registry, _books) = registry();
    let mut loader = Loader::new(registry);
    let err = loader.read(data.as_slice()).unwrap_err();
    assert!(matches!(err, Error::CorruptStream(_)));

    // everything before the damaged frame was applied
    assert_eq!(loader.stats().total(), 5);
}

#[test]
fn test_out_of_order_stream_fails() {
    let mut data = Vec::new();
    let mut attrs = Attributes::new();
    attrs.insert("lead".into(), Reference::one("Author", 10).into());
    protocol::write(&mut data, &Record::new("Book", 1, attrs)).unwrap();
    protocol::write(&mut data, &Record::new("Author", 10, Attributes::new())).unwrap();

    let (registry, books) = registry();
    let mut loader = Loader::new(registry);
    let err = loader.read(data.as_slice()).unwrap_err();
    assert!(matches!(err, Error::MissingReference { .. }));
    assert!(books.borrow().is_empty());
    assert!(loader.stats().is_empty());
}

#[test]
fn test_frame_limit_from_config() {
    let mut data = Vec::new();
    Dumper::session(&mut data, |dumper| dumper.dump_all(&library())).unwrap();

    let (registry, _books) = registry();
    let config = ReplicateConfig::default().with_max_frame_len(4);
    let mut loader = Loader::with_config(registry, config);
    let err = loader.read(data.as_slice()).unwrap_err();
    assert!(err.to_string().contains("exceeds limit"));
}

#[test]
fn test_loader_reemits_translated_stream() {
    let mut source = Vec::new();
    Dumper::session(&mut source, |dumper| dumper.dump_all(&library())).unwrap();

    let mut translated = Vec::new();
    {
        let (registry, _books) = registry();
        let mut loader = Loader::new(registry);
        loader.register(Stage::filter(RejectTypes::new(["Author"])));
        loader.register(Stage::finishing(StreamWriter::new(&mut translated)));
        loader.read(source.as_slice()).unwrap();
        loader.close().unwrap();
    }

    let records: Vec<Record> = protocol::read_records(translated.as_slice())
        .collect::<replicate_core::Result<_>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.type_name == "Book"));
    assert!(
        records
            .iter()
            .all(|r| r.attributes.values().all(|v| !v.has_references()))
    );
    assert_eq!(records[0].get("lead"), Some(&Value::Id(Id::Int(500))));
}

#[test]
fn test_generic_objects_round_trip() {
    let mut objects = Vec::new();
    for i in 1..=3 {
        let mut attrs = Attributes::new();
        attrs.insert("n".into(), Value::Int(i * 10));
        if i > 1 {
            attrs.insert("prev".into(), Reference::one("Node", i - 1).into());
        }
        objects.push(ReplicantObject::new("Node", i, attrs));
    }

    let mut data = Vec::new();
    Dumper::session(&mut data, |dumper| dumper.dump_all(&objects)).unwrap();

    let ids: Rc<RefCell<HashMap<Id, Id>>> = Rc::default();
    let sink = ids.clone();
    let registry = TypeRegistry::new().with("Node", ObjectType::starting_at("Node", 70));
    Loader::session(registry, move |loader| {
        loader.register(Stage::finishing(ProgressLog::new("nodes", 1)));
        loader.listen(move |entry| {
            sink.borrow_mut()
                .insert(entry.record.id.clone(), entry.final_id().clone());
            // node i points at node i - 1, which was loaded as 70 + (i - 2)
            let node = entry.object_as::<ReplicantObject>();
            if let (Some(node), Id::Int(i)) = (node, &entry.record.id) {
                if let Some(prev) = node.get("prev") {
                    assert_eq!(prev.as_id(), Some(&Id::Int(68 + i)));
                }
            }
            Ok(())
        });
        loader.read(data.as_slice())
    })
    .unwrap();

    let ids = ids.borrow();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[&Id::Int(1)], Id::Int(70));
    assert_eq!(ids[&Id::Int(3)], Id::Int(72));
}
