// tests/storage.rs

use std::error::Error;

use serde_json::{Value, json};

use pagewatch::dom::{MemoryDocument, PageStorage};
use pagewatch::storage::{
    cookie_value, copy_cookie, read_preference, set_cookie, update_local_storage_object,
};
use pagewatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn stored(page: &MemoryDocument, key: &str) -> Result<Value, Box<dyn Error>> {
    let raw = page.get_item(key)?.ok_or("missing entry")?;
    Ok(serde_json::from_str(&raw)?)
}

#[test]
fn update_merges_into_the_existing_object() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    page.set_item("settings", r#"{"volume":1,"quality":"480"}"#)?;

    update_local_storage_object(&page, "settings", object(json!({"quality": "1080", "muted": false})));

    assert_eq!(
        stored(&page, "settings")?,
        json!({"volume": 1, "quality": "1080", "muted": false})
    );
    Ok(())
}

#[test]
fn update_starts_from_an_empty_object() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    update_local_storage_object(&page, "fresh", object(json!({"a": 1})));
    assert_eq!(stored(&page, "fresh")?, json!({"a": 1}));

    // Valid JSON that is not an object is replaced.
    page.set_item("list", "[1,2,3]")?;
    update_local_storage_object(&page, "list", object(json!({"b": 2})));
    assert_eq!(stored(&page, "list")?, json!({"b": 2}));
    Ok(())
}

#[test]
fn update_leaves_non_json_values_alone() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    page.set_item("raw", "not json at all")?;
    update_local_storage_object(&page, "raw", object(json!({"a": 1})));
    assert_eq!(page.get_item("raw")?.as_deref(), Some("not json at all"));
    Ok(())
}

#[test]
fn blocked_storage_is_a_quiet_no_op() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    page.block_storage(true);

    update_local_storage_object(&page, "settings", object(json!({"a": 1})));
    assert_eq!(read_preference(&page, "settings", "a"), None);
    set_cookie(&page, "consent", "yes", 30);
    assert_eq!(cookie_value(&page, "consent"), None);
    assert_eq!(copy_cookie(&page, "consent", 30), None);

    page.block_storage(false);
    assert_eq!(page.get_item("settings")?, None);
    assert!(page.raw_cookies().is_empty());
    Ok(())
}

#[test]
fn read_preference_accepts_numbers_and_numeric_strings() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    page.set_item("a", r#"{"quality":720}"#)?;
    page.set_item("b", r#"{"quality":"1080p"}"#)?;
    page.set_item("c", r#"{"quality":"auto"}"#)?;
    page.set_item("d", "garbage")?;

    assert_eq!(read_preference(&page, "a", "quality"), Some(720));
    assert_eq!(read_preference(&page, "b", "quality"), Some(1080));
    assert_eq!(read_preference(&page, "c", "quality"), None);
    assert_eq!(read_preference(&page, "d", "quality"), None);
    assert_eq!(read_preference(&page, "a", "volume"), None);
    assert_eq!(read_preference(&page, "missing", "quality"), None);
    Ok(())
}

#[test]
fn set_cookie_encodes_the_value_and_sets_an_expiry() {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    set_cookie(&page, "greeting", "hello world;x", 30);

    assert_eq!(
        page.raw_cookies(),
        vec!["greeting=hello%20world%3Bx; max-age=2592000; path=/".to_string()]
    );
    assert_eq!(
        cookie_value(&page, "greeting").as_deref(),
        Some("hello%20world%3Bx")
    );
}

#[test]
fn set_cookie_keeps_uri_component_marks() {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    set_cookie(&page, "pref", "a-b_c.d!e~f*g'h(i)j/k=l&m\u{e9}", 1);

    assert_eq!(
        cookie_value(&page, "pref").as_deref(),
        Some("a-b_c.d!e~f*g'h(i)j%2Fk%3Dl%26m%C3%A9")
    );
}

#[test]
fn huge_cookie_lifetimes_saturate() {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    set_cookie(&page, "a", "b", 1_000_000_000_000_000);
    set_cookie(&page, "c", "d", u64::MAX);
    assert_eq!(copy_cookie(&page, "a", u64::MAX).as_deref(), Some("b"));

    let cookies = page.raw_cookies();
    let expected = format!("a=b; max-age={}; path=/", u64::MAX);
    assert_eq!(cookies.len(), 3);
    assert_eq!(cookies.last(), Some(&expected));
}

#[test]
fn copy_cookie_refreshes_an_existing_cookie() {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    set_cookie(&page, "session", "abc", 1);
    set_cookie(&page, "session_id", "zzz", 1);

    assert_eq!(copy_cookie(&page, "session", 365).as_deref(), Some("abc"));
    assert_eq!(
        page.raw_cookies().last().map(String::as_str),
        Some("session=abc; max-age=31536000; path=/")
    );

    assert_eq!(copy_cookie(&page, "nope", 365), None);
    assert_eq!(copy_cookie(&page, "", 365), None);
}
