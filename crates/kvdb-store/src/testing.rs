//! Backend-agnostic contract checks.
//!
//! Every backend crate runs [`run_store_contract`] against a fresh, empty
//! store from its own tests.

use crate::iterator::collect_entries;
use crate::traits::Store;

/// Exercise the full read/write/iterate/batch/snapshot surface of `store`.
///
/// The store must be empty and open on entry; it is left open, with
/// contents.
pub fn run_store_contract(store: &dyn Store) {
    check_put_get_delete(store);
    check_iteration(store);
    check_batch(store);
    check_snapshot_isolation(store);
    check_iterator_isolation(store);
}

fn check_put_get_delete(store: &dyn Store) {
    assert!(!store.has(b"contract/k").unwrap());
    assert_eq!(store.get(b"contract/k").unwrap(), None);

    store.put(b"contract/k", b"v1").unwrap();
    assert!(store.has(b"contract/k").unwrap());
    assert_eq!(store.get(b"contract/k").unwrap(), Some(b"v1".to_vec()));

    store.put(b"contract/k", b"v2").unwrap();
    assert_eq!(store.get(b"contract/k").unwrap(), Some(b"v2".to_vec()));

    store.delete(b"contract/k").unwrap();
    assert!(!store.has(b"contract/k").unwrap());
    assert_eq!(store.get(b"contract/k").unwrap(), None);

    // Deleting again is not an error.
    store.delete(b"contract/k").unwrap();

    // Empty values are values, not absence.
    store.put(b"contract/empty", b"").unwrap();
    assert!(store.has(b"contract/empty").unwrap());
    assert_eq!(store.get(b"contract/empty").unwrap(), Some(Vec::new()));
    store.delete(b"contract/empty").unwrap();
}

fn check_iteration(store: &dyn Store) {
    for key in ["iter/b", "iter/a", "iter/c", "iter/ab", "other/x"] {
        store.put(key.as_bytes(), key.as_bytes()).unwrap();
    }

    let keys = |prefix: &[u8], start: &[u8]| -> Vec<Vec<u8>> {
        collect_entries(store.new_iterator(prefix, start))
            .into_iter()
            .map(|(k, _)| k)
            .collect()
    };

    assert_eq!(
        keys(b"iter/", b""),
        vec![
            b"iter/a".to_vec(),
            b"iter/ab".to_vec(),
            b"iter/b".to_vec(),
            b"iter/c".to_vec()
        ]
    );
    assert_eq!(
        keys(b"iter/", b"b"),
        vec![b"iter/b".to_vec(), b"iter/c".to_vec()]
    );
    // Absent start seeks to the next key.
    assert_eq!(
        keys(b"iter/", b"aa"),
        vec![b"iter/ab".to_vec(), b"iter/b".to_vec(), b"iter/c".to_vec()]
    );
    assert!(keys(b"none/", b"").is_empty());

    let all = keys(b"", b"");
    assert!(all.windows(2).all(|w| w[0] < w[1]), "keys must ascend");
    assert!(all.contains(&b"other/x".to_vec()));

    let mut it = store.new_iterator(b"iter/", b"");
    assert!(it.next());
    assert_eq!(it.key(), Some(&b"iter/a"[..]));
    assert_eq!(it.value(), Some(&b"iter/a"[..]));
    it.release();
    it.release();
    assert!(!it.next());
    assert!(it.error().is_none());
}

fn check_batch(store: &dyn Store) {
    let mut batch = store.new_batch();
    assert!(batch.is_empty());
    batch.put(b"batch/1", b"one").unwrap();
    batch.put(b"batch/2", b"two").unwrap();
    batch.put(b"batch/3", b"three").unwrap();
    batch.delete(b"batch/2").unwrap();
    assert_eq!(batch.len(), 4);
    assert!(batch.value_size() > 0);

    // Nothing visible before write.
    assert!(!store.has(b"batch/1").unwrap());

    batch.write().unwrap();
    assert_eq!(store.get(b"batch/1").unwrap(), Some(b"one".to_vec()));
    assert!(!store.has(b"batch/2").unwrap());
    assert_eq!(store.get(b"batch/3").unwrap(), Some(b"three".to_vec()));

    batch.reset();
    assert!(batch.is_empty());
    assert_eq!(batch.value_size(), 0);

    batch.delete_range(b"batch/", b"batch/3").unwrap();
    batch.write().unwrap();
    assert!(!store.has(b"batch/1").unwrap());
    assert!(store.has(b"batch/3").unwrap());

    batch.reset();
    batch.put(b"batch/replayed", b"r").unwrap();
    batch.replay(&store).unwrap();
    assert_eq!(store.get(b"batch/replayed").unwrap(), Some(b"r".to_vec()));
}

fn check_snapshot_isolation(store: &dyn Store) {
    store.put(b"snap/k", b"before").unwrap();
    store.put(b"snap/doomed", b"x").unwrap();

    let mut snap = store.get_snapshot().unwrap();
    store.put(b"snap/k", b"after").unwrap();
    store.put(b"snap/new", b"n").unwrap();
    store.delete(b"snap/doomed").unwrap();

    assert_eq!(snap.get(b"snap/k").unwrap(), Some(b"before".to_vec()));
    assert!(!snap.has(b"snap/new").unwrap());
    assert!(snap.has(b"snap/doomed").unwrap());
    let seen: Vec<Vec<u8>> = collect_entries(snap.new_iterator(b"snap/", b""))
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(seen, vec![b"snap/doomed".to_vec(), b"snap/k".to_vec()]);

    snap.release();
    assert!(!snap.has(b"snap/k").unwrap());
    assert_eq!(snap.get(b"snap/k").unwrap(), None);
    assert!(collect_entries(snap.new_iterator(b"", b"")).is_empty());
    snap.release();
}

fn check_iterator_isolation(store: &dyn Store) {
    store.put(b"live/a", b"1").unwrap();
    let it = store.new_iterator(b"live/", b"");
    store.put(b"live/b", b"2").unwrap();
    let seen = collect_entries(it);
    assert_eq!(seen, vec![(b"live/a".to_vec(), b"1".to_vec())]);
}
