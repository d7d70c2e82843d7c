//! Collection pipeline against a mock PostgREST server.
//!
//! Exercises the real HTTP connector, the paging loop, the filter, the CSV
//! sink and the checkpoint store together.

use post_harvest::accounts::{enumerate_accounts, resolve_accounts};
use post_harvest::checkpoint::{AccountStatus, Checkpoint, CheckpointStore};
use post_harvest::collect::{CollectSettings, Collector};
use post_harvest::config::{ApiConfig, CollectConfig};
use post_harvest::connector_rest::RestSource;
use post_harvest::filter::ContentFilter;
use post_harvest::models::Account;
use post_harvest::paging::PagingEnd;
use post_harvest::progress::NoProgress;
use post_harvest::traits::{Page, PostSource};
use post_harvest::writer::CsvSink;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test-key";

fn api(server: &MockServer, page_size: u64) -> ApiConfig {
    ApiConfig {
        base_url: format!("{}/rest/v1/", server.uri()),
        api_key: Some(KEY.to_string()),
        api_key_env: "HARVEST_TEST_UNUSED".to_string(),
        page_size,
        timeout_secs: 5,
    }
}

fn posts(account_id: &str, range: std::ops::Range<usize>) -> Value {
    Value::Array(
        range
            .map(|i| {
                json!({
                    "tweet_id": format!("{}-{}", account_id, i),
                    "account_id": account_id,
                    "created_at": "2024-03-01T12:00:00Z",
                    "full_text": format!("a perfectly ordinary post, number {}", i),
                    "retweet_count": i,
                    "favorite_count": 0,
                    "internal_rank": 0.5,
                })
            })
            .collect(),
    )
}

async fn mount_posts(server: &MockServer, account_id: &str, offset: u64, body: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/tweets"))
        .and(query_param("account_id", format!("eq.{}", account_id)))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn columns() -> Vec<String> {
    CollectConfig::default().columns
}

fn read_rows(path: &std::path::Path) -> Vec<csv::StringRecord> {
    csv::Reader::from_path(path)
        .unwrap()
        .records()
        .map(|r| r.unwrap())
        .collect()
}

#[tokio::test]
async fn requests_carry_key_and_paging_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/account"))
        .and(header("apikey", KEY))
        .and(header("authorization", format!("Bearer {}", KEY).as_str()))
        .and(query_param("limit", "2"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"username": "alice", "account_id": "1"},
            {"username": "bob", "account_id": 2}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/account"))
        .and(query_param("offset", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"username": "carol", "account_id": "3"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = RestSource::new(&api(&server, 2)).unwrap();
    let (accounts, end) = enumerate_accounts(&source, 2).await;

    assert_eq!(end, PagingEnd::Exhausted);
    let handles: Vec<_> = accounts.iter().map(|a| a.handle.as_str()).collect();
    assert_eq!(handles, ["alice", "bob", "carol"]);
    assert_eq!(accounts[1].id, "2");
}

#[tokio::test]
async fn lookup_uses_username_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/account"))
        .and(query_param("username", "eq.alice"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"username": "alice", "account_id": "11"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/account"))
        .and(query_param("username", "eq.ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let source = RestSource::new(&api(&server, 10)).unwrap();
    let found = resolve_accounts(&source, &["alice".to_string(), "ghost".to_string()]).await;
    assert_eq!(
        found,
        vec![Account {
            handle: "alice".into(),
            id: "11".into()
        }]
    );
}

#[tokio::test]
async fn non_ok_status_is_a_rejection_and_bad_body_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tweets"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "JWT expired"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "not a list"})))
        .mount(&server)
        .await;

    let source = RestSource::new(&api(&server, 10)).unwrap();
    let account = Account {
        handle: "alice".into(),
        id: "1".into(),
    };
    match source.posts_page(&account, 0, 10).await.unwrap() {
        Page::Rejected(status) => assert_eq!(status, 401),
        Page::Items(_) => panic!("expected a rejection"),
    }
    assert!(source.accounts_page(0, 10).await.is_err());
}

#[tokio::test]
async fn server_error_marks_partial_and_next_run_finishes() {
    let server = MockServer::start().await;
    // alice: 3 posts, one of them a repost.
    let mut alice = posts("1", 0..2);
    alice.as_array_mut().unwrap()[1]["full_text"] = json!("RT @bob: something worth repeating");
    mount_posts(&server, "1", 0, alice).await;
    mount_posts(&server, "1", 2, posts("1", 2..3)).await;
    // bob: 5 posts; the page at offset 2 fails once.
    mount_posts(&server, "2", 0, posts("2", 0..2)).await;
    mount_posts(&server, "2", 2, posts("2", 2..4)).await;
    mount_posts(&server, "2", 4, posts("2", 4..5)).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tweets"))
        .and(query_param("account_id", "eq.2"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let store = CheckpointStore::new(tmp.path().join("collection_checkpoint_test.json"));
    let csv = tmp.path().join("tweets_data_filtered_test.csv");
    let source = RestSource::new(&api(&server, 2)).unwrap();
    let accounts = vec![
        Account {
            handle: "alice".into(),
            id: "1".into(),
        },
        Account {
            handle: "bob".into(),
            id: "2".into(),
        },
    ];
    let settings = CollectSettings::new(2, &CollectConfig::default());

    let mut state = Checkpoint::new("tweets_data_filtered_test.csv");
    let first = Collector::new(
        &source,
        ContentFilter::default(),
        settings.clone(),
        store.clone(),
        CsvSink::create(&csv, &columns()).unwrap(),
        &NoProgress,
    );
    let summary = first.run(&accounts, &mut state).await.unwrap();
    assert_eq!(summary.accounts_completed, 1);
    assert_eq!(summary.accounts_partial, 1);
    assert_eq!(summary.filtered, 1);
    assert_eq!(state.status("bob"), AccountStatus::Partial { offset: 2 });
    assert!(store.path().exists());
    assert_eq!(read_rows(&csv).len(), 4);

    let mut resumed = store.load().unwrap();
    let second = Collector::new(
        &source,
        ContentFilter::default(),
        settings,
        store.clone(),
        CsvSink::open(&csv).unwrap(),
        &NoProgress,
    );
    let summary = second.run(&accounts, &mut resumed).await.unwrap();
    assert_eq!(summary.accounts_skipped, 1);
    assert_eq!(summary.processed, 3);
    assert!(!store.path().exists());

    let rows = read_rows(&csv);
    let header: Vec<String> = csv::Reader::from_path(&csv)
        .unwrap()
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    assert_eq!(header, columns());
    let ids: Vec<&str> = rows.iter().map(|r| r.get(0).unwrap()).collect();
    assert_eq!(ids, ["1-0", "1-2", "2-0", "2-1", "2-2", "2-3", "2-4"]);

    let user_idx = header.iter().position(|h| h == "username").unwrap();
    assert!(rows[..2].iter().all(|r| &r[user_idx] == "alice"));
    assert!(rows[2..].iter().all(|r| &r[user_idx] == "bob"));
    // Fields outside the header never reach the table.
    assert!(!header.iter().any(|h| h == "internal_rank"));
}
