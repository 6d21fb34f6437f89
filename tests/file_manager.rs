//! File Manager Integration Tests
//!
//! Tests for id encoding, shard layout and variant CRUD.

use phototree::files::{decode_id, encode_id, relative_path, strip_separators};
use phototree::{ExtensionChain, FileManager};
use std::sync::Arc;

use tempfile::TempDir;

async fn open_manager() -> (TempDir, FileManager) {
    let temp = TempDir::new().unwrap();
    let mut manager = FileManager::new();
    manager.open(temp.path().join("photos")).await.unwrap();
    (temp, manager)
}

fn chain(s: &str) -> ExtensionChain {
    ExtensionChain::new(s).unwrap()
}

#[tokio::test]
async fn test_upload_then_get_in_sharded_path() {
    let (_temp, manager) = open_manager().await;
    let id = "0123456789abcdef0123456789abcdef";
    let encoded = encode_id(id).unwrap();
    assert!(!encoded.contains(['+', '/', '=']));

    let blob: Vec<u8> = (0..=255u8).collect();
    let stored = manager.upload(&blob, id, &chain(".jpg")).await.unwrap();

    let relative = stored.strip_prefix(manager.root().unwrap()).unwrap();
    let first = relative.iter().next().unwrap().to_str().unwrap();
    assert_eq!(first, &encoded[..2]);
    assert_eq!(relative, relative_path(id, &chain(".jpg")).unwrap());
    assert_eq!(stored, manager.path(id, &chain(".jpg")).unwrap());

    assert_eq!(manager.get(id, &chain(".jpg")).await.unwrap(), blob);
}

#[test]
fn test_encoding_is_bijective() {
    let ids = [
        "0123456789abcdef0123456789abcdef",
        "abc",
        "photo_2021_ä",
        "a?b>c~d",
        "IMG 0001",
    ];
    for id in ids {
        let encoded = encode_id(id).unwrap();
        assert_eq!(decode_id(&encoded).unwrap(), id);
    }

    // distinct canonical ids never share an encoding
    let mut encodings: Vec<_> = ids.iter().map(|id| encode_id(id).unwrap()).collect();
    encodings.sort();
    encodings.dedup();
    assert_eq!(encodings.len(), ids.len());
}

#[test]
fn test_uuid_separators_do_not_change_path() {
    let dashed = "01234567-89ab-cdef-0123-456789abcdef";
    assert_eq!(strip_separators(dashed), "0123456789abcdef0123456789abcdef");
    assert_eq!(
        relative_path(dashed, &chain(".jpg")).unwrap(),
        relative_path("0123456789abcdef0123456789abcdef", &chain(".jpg")).unwrap()
    );
}

#[tokio::test]
async fn test_variants_are_independent() {
    let (_temp, manager) = open_manager().await;
    let id = "photo-0001";

    manager.upload(b"original", id, &chain(".jpg")).await.unwrap();
    manager.upload(b"thumb", id, &chain(".thumbnail.jpg")).await.unwrap();
    manager.upload(b"bare", id, &ExtensionChain::none()).await.unwrap();

    assert_eq!(manager.get(id, &chain(".jpg")).await.unwrap(), b"original");
    assert_eq!(manager.get(id, &chain(".thumbnail.jpg")).await.unwrap(), b"thumb");
    assert_eq!(manager.get(id, &ExtensionChain::none()).await.unwrap(), b"bare");

    assert!(manager.delete(id, &chain(".thumbnail.jpg")).await.unwrap());
    let variants = manager.variants(id).await.unwrap();
    assert_eq!(variants, vec![ExtensionChain::none(), chain(".jpg")]);
}

#[tokio::test]
async fn test_delete_all_removes_every_variant_only() {
    let (_temp, manager) = open_manager().await;

    // "abc" and "abcd" share a shard and an encoded prefix
    let id = "abc";
    let neighbour = "abcd";
    assert_eq!(&encode_id(id).unwrap()[..4], &encode_id(neighbour).unwrap()[..4]);

    for ext in [".jpg", ".raw", ".raw.thumbnail.jpg"] {
        manager.upload(b"x", id, &chain(ext)).await.unwrap();
    }
    manager.upload(b"keep", neighbour, &chain(".jpg")).await.unwrap();

    assert_eq!(manager.delete_all(id).await.unwrap(), 3);
    assert!(manager.variants(id).await.unwrap().is_empty());
    assert!(manager.get(id, &chain(".jpg")).await.unwrap_err().is_not_found());
    assert_eq!(manager.get(neighbour, &chain(".jpg")).await.unwrap(), b"keep");

    assert_eq!(manager.delete_all(id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_all_removes_empty_shards() {
    let (_temp, manager) = open_manager().await;
    let id = "0123456789abcdef";
    let stored = manager.upload(b"x", id, &chain(".jpg")).await.unwrap();
    let outer = stored.parent().unwrap().parent().unwrap().to_path_buf();

    assert_eq!(manager.delete_all(id).await.unwrap(), 1);
    assert!(!outer.exists());
    assert!(manager.root().unwrap().exists());
}

#[tokio::test]
async fn test_concurrent_uploads_of_distinct_ids() {
    let (_temp, manager) = open_manager().await;
    let manager = Arc::new(manager);
    let ids: Vec<String> = (0..16).map(|i| format!("photo-{:04}", i)).collect();

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.upload(id.as_bytes(), &id, &chain(".jpg")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for id in &ids {
        assert_eq!(manager.get(id, &chain(".jpg")).await.unwrap(), id.as_bytes());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_while_uploading_neighbour_in_same_shard() {
    let (_temp, manager) = open_manager().await;
    let manager = Arc::new(manager);
    let jpg = chain(".jpg");

    // "abcx" and "abcy<n>" both encode under the YW/Jj shard
    assert_eq!(&encode_id("abcx").unwrap()[..4], &encode_id("abcy0").unwrap()[..4]);

    for round in 0..500 {
        manager.upload(b"old", "abc-x", &jpg).await.unwrap();
        let neighbour = format!("abcy{}", round);

        let deleter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.delete("abc-x", &chain(".jpg")).await })
        };
        let uploader = {
            let manager = Arc::clone(&manager);
            let id = neighbour.clone();
            tokio::spawn(async move { manager.upload(id.as_bytes(), &id, &chain(".jpg")).await })
        };

        assert!(deleter.await.unwrap().unwrap());
        uploader.await.unwrap().unwrap();
        assert_eq!(manager.get(&neighbour, &jpg).await.unwrap(), neighbour.as_bytes());

        // leave the shard empty for the next round
        assert!(manager.delete(&neighbour, &jpg).await.unwrap());
    }
}

#[tokio::test]
async fn test_same_key_last_writer_wins() {
    let (_temp, manager) = open_manager().await;
    let id = "photo-0001";
    for round in 0..5u8 {
        manager.upload(&[round; 64], id, &chain(".jpg")).await.unwrap();
    }
    assert_eq!(manager.get(id, &chain(".jpg")).await.unwrap(), vec![4u8; 64]);
    // no staging files are left behind
    assert_eq!(manager.variants(id).await.unwrap(), vec![chain(".jpg")]);
    let shard = manager.path(id, &chain(".jpg")).unwrap();
    let entries = std::fs::read_dir(shard.parent().unwrap()).unwrap().count();
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn test_invalid_keys_rejected() {
    let (_temp, manager) = open_manager().await;
    assert!(ExtensionChain::new("jpg").is_err());
    assert!(manager.upload(b"x", "ab", &chain(".jpg")).await.is_err());
    assert!(manager.upload(b"x", "", &chain(".jpg")).await.is_err());
}
