//! Concurrent use of one mapper from many threads.

use std::sync::{Arc, Barrier};
use std::thread;

use rowmap_core::{
    ColumnShape, CommandKind, Identity, Mapper, MapperOptions, MemoryCursor, Value, WireType,
};

#[derive(Debug, Default, Clone, PartialEq)]
struct Ticket {
    id: i64,
    title: String,
}

rowmap_core::entity! {
    Ticket {
        id: i64 => "Id",
        title: String => "Title",
    }
}

fn tickets(count: i64) -> MemoryCursor {
    MemoryCursor::new(
        ColumnShape::of(&[("Id", WireType::Int64), ("Title", WireType::String)]),
        (0..count)
            .map(|i| vec![Value::I64(i), Value::Text(format!("t{i}"))])
            .collect(),
    )
}

fn identity() -> Identity {
    Identity::new("select Id, Title from tickets", CommandKind::Text, "mem").with_target::<Ticket>()
}

#[test]
fn concurrent_first_reads_agree() {
    let mapper = Arc::new(Mapper::default());
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let mapper = Arc::clone(&mapper);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                mapper
                    .read_all::<Ticket, _>(&identity(), &mut tickets(50))
                    .unwrap()
            })
        })
        .collect();

    let expected = mapper.read_all::<Ticket, _>(&identity(), &mut tickets(50)).unwrap();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
    assert_eq!(mapper.cache_len(), 1);
    let hits = mapper.hit_count(&identity()).unwrap();
    mapper.read_all::<Ticket, _>(&identity(), &mut tickets(1)).unwrap();
    assert_eq!(mapper.hit_count(&identity()), Some(hits + 1));
}

#[test]
fn readers_survive_shape_changes_from_other_threads() {
    let mapper = Arc::new(Mapper::default());
    let wide = || {
        MemoryCursor::new(
            ColumnShape::of(&[
                ("Id", WireType::Int64),
                ("Title", WireType::String),
                ("Extra", WireType::Boolean),
            ]),
            vec![vec![Value::I64(7), Value::from("wide"), Value::Bool(true)]],
        )
    };

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let mapper = Arc::clone(&mapper);
            thread::spawn(move || {
                for _ in 0..50 {
                    if n % 2 == 0 {
                        let rows = mapper.read_all::<Ticket, _>(&identity(), &mut tickets(3)).unwrap();
                        assert_eq!(rows.len(), 3);
                        assert_eq!(rows[2].title, "t2");
                    } else {
                        let rows = mapper.read_all::<Ticket, _>(&identity(), &mut wide()).unwrap();
                        assert_eq!(rows, vec![Ticket { id: 7, title: "wide".into() }]);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(mapper.cache_len(), 1);
}

#[test]
fn sweeping_under_load_keeps_results_correct() {
    let options = MapperOptions {
        sweep_every_insertions: 4,
        ..MapperOptions::default()
    };
    let mapper = Arc::new(Mapper::new(options));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let mapper = Arc::clone(&mapper);
            thread::spawn(move || {
                for i in 0..40 {
                    let id = Identity::new(&format!("select {t}, {i}"), CommandKind::Text, "mem")
                        .with_target::<Ticket>();
                    let rows = mapper.read_all::<Ticket, _>(&id, &mut tickets(2)).unwrap();
                    assert_eq!(rows[1].id, 1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(mapper.cache_len() < 160);
}
