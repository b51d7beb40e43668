use super::*;

#[test]
fn test_put_get_roundtrip() {
    let db = InMemoryDB::new();

    for b1 in 0..10_u8 {
        for b2 in 0..10_u8 {
            let bytes = vec![b1, b2];

            db.put_batch(Column::Records, vec![(bytes.clone(), bytes.clone())])
                .expect("put should succeed");

            assert_eq!(
                db.get(Column::Records, &bytes)
                    .expect("get should succeed")
                    .expect("key should exist"),
                bytes
            );
        }
    }

    assert_eq!(
        None,
        db.get(Column::Records, &[]).expect("get should succeed")
    );
}

#[test]
fn test_get_all_is_ordered() {
    let db = InMemoryDB::new();

    db.put_batch(
        Column::Records,
        vec![
            (b"charlie".to_vec(), b"3".to_vec()),
            (b"alpha".to_vec(), b"1".to_vec()),
            (b"bravo".to_vec(), b"2".to_vec()),
        ],
    )
    .expect("put should succeed");

    let all = db.get_all(Column::Records).expect("get_all should succeed");
    let keys: Vec<&[u8]> = all.iter().map(|(k, _)| k.as_slice()).collect();

    assert_eq!(keys, [&b"alpha"[..], &b"bravo"[..], &b"charlie"[..]]);
}

#[test]
fn test_columns_are_isolated() {
    let db = InMemoryDB::new();

    db.put_batch(Column::Records, vec![(b"key".to_vec(), b"record".to_vec())])
        .expect("put should succeed");
    db.put_batch(Column::Session, vec![(b"key".to_vec(), b"token".to_vec())])
        .expect("put should succeed");

    assert_eq!(
        db.get(Column::Records, b"key").unwrap().unwrap(),
        b"record"
    );
    assert_eq!(db.get(Column::Session, b"key").unwrap().unwrap(), b"token");

    db.clear(Column::Records).expect("clear should succeed");

    assert_eq!(db.get(Column::Records, b"key").unwrap(), None);
    assert!(db.get(Column::Session, b"key").unwrap().is_some());
}

#[test]
fn test_delete() {
    let db = InMemoryDB::new();

    db.put_batch(Column::Records, vec![(b"key".to_vec(), b"value".to_vec())])
        .expect("put should succeed");
    db.delete(Column::Records, b"key").expect("delete");

    assert_eq!(db.get(Column::Records, b"key").unwrap(), None);

    // Deleting an absent key is fine.
    db.delete(Column::Records, b"key").expect("delete again");
}
