use futures_util::TryStreamExt;
use proptest::prelude::*;
use tessera_store::{Entry, KvStore, KvStoreExt, MemoryStore, LIST_PAGE_SIZE};

async fn seeded(count: u32) -> MemoryStore<u32, String> {
    let store = MemoryStore::new();
    let entries: Vec<Entry<u32, String>> = (1..=count)
        .map(|k| Entry::new(k, format!("value-{k}")))
        .collect();
    store.set(entries).await.unwrap();
    store
}

#[tokio::test]
async fn list_crosses_page_seams_without_duplicates_or_gaps() {
    let store = seeded(250).await;

    let all: Vec<Entry<u32, String>> = store.list().try_collect().await.unwrap();

    assert_eq!(all.len(), 250);
    let keys: Vec<u32> = all.iter().map(|e| e.key).collect();
    assert_eq!(keys, (1..=250).collect::<Vec<u32>>());
}

#[tokio::test]
async fn list_reverse_yields_same_set_descending() {
    let store = seeded(250).await;

    let all: Vec<Entry<u32, String>> = store.list_reverse().try_collect().await.unwrap();

    let keys: Vec<u32> = all.iter().map(|e| e.key).collect();
    assert_eq!(keys, (1..=250).rev().collect::<Vec<u32>>());
}

#[tokio::test]
async fn list_terminates_on_tables_smaller_than_a_page() {
    let empty: MemoryStore<u32, String> = MemoryStore::new();
    let none: Vec<Entry<u32, String>> = empty.list().try_collect().await.unwrap();
    assert!(none.is_empty());

    let single = seeded(1).await;
    let one: Vec<Entry<u32, String>> = single.list().try_collect().await.unwrap();
    assert_eq!(one, vec![Entry::new(1, "value-1".to_string())]);
}

#[tokio::test]
async fn list_handles_exact_page_multiples() {
    let store = seeded(2 * LIST_PAGE_SIZE as u32).await;

    let all: Vec<Entry<u32, String>> = store.list().try_collect().await.unwrap();

    assert_eq!(all.len(), 2 * LIST_PAGE_SIZE);
    let keys: Vec<u32> = all.iter().map(|e| e.key).collect();
    assert_eq!(keys, (1..=2 * LIST_PAGE_SIZE as u32).collect::<Vec<u32>>());
}

#[tokio::test]
async fn list_is_restartable_per_call() {
    let store = seeded(120).await;

    let first: Vec<Entry<u32, String>> = store.list().try_collect().await.unwrap();
    let second: Vec<Entry<u32, String>> = store.list().try_collect().await.unwrap();

    assert_eq!(first, second);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn list_matches_sorted_key_set(keys in prop::collection::btree_set(any::<u32>(), 0..300)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let store = MemoryStore::new();
            let entries: Vec<Entry<u32, u32>> =
                keys.iter().map(|&k| Entry::new(k, k)).collect();
            store.set(entries).await.unwrap();

            let listed: Vec<Entry<u32, u32>> = store.list().try_collect().await.unwrap();
            let listed_keys: Vec<u32> = listed.iter().map(|e| e.key).collect();
            let expected: Vec<u32> = keys.iter().copied().collect();
            prop_assert_eq!(listed_keys, expected);

            let reversed: Vec<Entry<u32, u32>> =
                store.list_reverse().try_collect().await.unwrap();
            let reversed_keys: Vec<u32> = reversed.iter().map(|e| e.key).collect();
            let expected_rev: Vec<u32> = keys.iter().rev().copied().collect();
            prop_assert_eq!(reversed_keys, expected_rev);
            Ok(())
        })?;
    }
}
