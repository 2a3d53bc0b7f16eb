use fixedtree::Engine;

/// Creates a temporary, not-yet-created database path.
/// The returned `TempPath` keeps the directory entry reserved for cleanup,
/// but no file exists at it until `Engine::open` creates one.
fn temp_db_path() -> tempfile::TempPath {
    let temp_file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    let path = temp_file.into_temp_path();
    std::fs::remove_file(&path).expect("failed to clear placeholder file");
    path
}

#[test]
fn large_scale_insertion_builds_a_multi_level_tree() {
    let path = temp_db_path();
    let mut engine = Engine::open(&path).expect("failed to open engine");
    engine.initialize().expect("failed to initialize root");

    const NUM_KEYS: u32 = 2000;
    for key in 0..NUM_KEYS {
        let value = format!("value_{}", key);
        engine
            .insert(key, value.as_bytes())
            .unwrap_or_else(|e| panic!("failed to insert key {}: {}", key, e));
    }

    engine.close().expect("failed to close engine");
}

#[test]
fn persists_across_sessions() {
    let path = temp_db_path();

    const NUM_KEYS: u32 = 300;
    {
        let mut engine = Engine::open(&path).expect("failed to open engine");
        engine.initialize().expect("failed to initialize root");
        for key in 0..NUM_KEYS {
            let value = format!("persist_value_{}", key);
            engine
                .insert(key, value.as_bytes())
                .unwrap_or_else(|e| panic!("failed to insert key {}: {}", key, e));
        }
        engine.close().expect("failed to close engine");
    }

    // Re-open the same file and confirm further inserts still succeed
    // against the tree shape recovered from the header.
    {
        let mut engine = Engine::open(&path).expect("failed to reopen engine");
        engine.initialize().expect("initialize must be a no-op on a populated file");
        for key in NUM_KEYS..NUM_KEYS + 50 {
            let value = format!("persist_value_{}", key);
            engine
                .insert(key, value.as_bytes())
                .unwrap_or_else(|e| panic!("failed to insert key {} after reopen: {}", key, e));
        }
        engine.close().expect("failed to close engine");
    }
}

#[test]
fn reversed_insertion_order_still_builds_a_valid_tree() {
    let path = temp_db_path();
    let mut engine = Engine::open(&path).expect("failed to open engine");
    engine.initialize().expect("failed to initialize root");

    for key in (0..500u32).rev() {
        let value = format!("value_{}", key);
        engine
            .insert(key, value.as_bytes())
            .unwrap_or_else(|e| panic!("failed to insert key {}: {}", key, e));
    }

    engine.close().expect("failed to close engine");
}

#[test]
fn duplicate_key_across_a_split_tree_is_rejected() {
    let path = temp_db_path();
    let mut engine = Engine::open(&path).expect("failed to open engine");
    engine.initialize().expect("failed to initialize root");

    for key in 0..300u32 {
        engine.insert(key, b"payload").unwrap();
    }

    let err = engine.insert(150, b"duplicate").unwrap_err();
    assert!(matches!(err, fixedtree::Error::DuplicateKey(150)));
}
