//! Concurrent inserters sharing one heap file and one buffer pool

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use heapstore_engine::{
    BufferPool, EngineConfig, Field, FieldType, HeapFile, Schema, TransactionId, Tuple,
};
use tempfile::tempdir;

// One 132-byte text tuple per 140-byte page, so every insert appends a page
const PAGE_SIZE: usize = 140;
const THREADS: usize = 8;
const INSERTS_PER_THREAD: usize = 20;

fn config() -> EngineConfig {
    EngineConfig {
        page_size: PAGE_SIZE,
        pool_pages: 1024,
        lock_timeout_ms: 10_000,
    }
}

fn names() -> Arc<Schema> {
    Arc::new(Schema::new(&[FieldType::Text], &["name"]).unwrap())
}

fn scan_names(file: &HeapFile) -> Vec<String> {
    let pool = BufferPool::new(&config());
    let file = Arc::new(HeapFile::open(file.path(), file.schema().clone(), PAGE_SIZE).unwrap());
    pool.register(file.clone()).unwrap();

    let txn = TransactionId::new();
    let mut scan = file.scan(txn, &pool);
    scan.open().unwrap();
    scan.iter()
        .map(|t| match t.unwrap().field(0).unwrap() {
            Field::Text(s) => s.clone(),
            other => panic!("unexpected {other}"),
        })
        .collect()
}

fn insert_concurrently(dir: &std::path::Path, run: usize) -> (Arc<HeapFile>, HashSet<String>) {
    let schema = names();
    let file = Arc::new(
        HeapFile::create(dir.join(format!("run{run}.dat")), schema.clone(), PAGE_SIZE).unwrap(),
    );
    assert_eq!(file.layout().slots, 1);
    let pool = Arc::new(BufferPool::new(&config()));
    pool.register(file.clone()).unwrap();

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let (file, pool, schema) = (file.clone(), pool.clone(), schema.clone());
            thread::spawn(move || {
                let mut committed = Vec::new();
                for i in 0..INSERTS_PER_THREAD {
                    let name = format!("t{t}-{i}");
                    let txn = TransactionId::new();
                    let mut tuple = Tuple::new(schema.clone(), vec![Field::Text(name.clone())]).unwrap();
                    file.insert_tuple(txn, pool.as_ref(), &mut tuple).unwrap();
                    pool.transaction_complete(txn, true).unwrap();
                    committed.push(name);
                }
                committed
            })
        })
        .collect();

    let mut committed = HashSet::new();
    for worker in workers {
        committed.extend(worker.join().unwrap());
    }
    (file, committed)
}

#[test]
fn test_concurrent_appends_keep_every_committed_row() {
    let dir = tempdir().unwrap();

    for run in 0..10 {
        let (file, committed) = insert_concurrently(dir.path(), run);
        assert_eq!(committed.len(), THREADS * INSERTS_PER_THREAD);

        let on_disk = scan_names(&file);
        assert_eq!(on_disk.len(), committed.len(), "run {run}: rows lost on disk");
        assert_eq!(on_disk.into_iter().collect::<HashSet<_>>(), committed);
        assert_eq!(file.page_count().unwrap() as usize, committed.len());
    }
}
