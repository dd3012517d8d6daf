//! End-to-end migration runs against in-memory stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sales_order_migrate::core::{
    Document, MapReader, ProgressReporter, Record, RecordTransformer, TransformerFactory,
};
use sales_order_migrate::eav::SINK_FIELDS;
use sales_order_migrate::state::TaskStatus;
use sales_order_migrate::{
    Config, LogProgress, MemoryStore, MigrateError, MigrationState, Orchestrator, ProgressMode,
    RawRow, ResourceStore, Value,
};

const CONFIG: &str = r#"
source:
  host: legacy-db
  database: magento1
  user: migrate
destination:
  host: new-db
  database: magento2
  user: migrate
migration:
  page_size: 2
  documents: [sales_order]
  eav:
    attributes: [coupon_code]
map:
  documents:
    sales_order: sales_order
"#;

fn config() -> Config {
    Config::from_yaml(CONFIG).unwrap()
}

fn order(entity_id: i64, store_id: Option<i64>, coupon: Option<&str>) -> RawRow {
    let mut row = RawRow::new();
    row.insert("entity_id".into(), Value::Int(entity_id));
    row.insert("store_id".into(), store_id.map_or(Value::Null, Value::Int));
    row.insert("status".into(), Value::Text("complete".into()));
    row.insert(
        "coupon_code".into(),
        coupon.map_or(Value::Null, |c| Value::Text(c.into())),
    );
    row
}

fn metadata(code: &str, attribute_id: i64, entity_type_id: i64) -> RawRow {
    let mut row = RawRow::new();
    row.insert("attribute_id".into(), Value::Int(attribute_id));
    row.insert("entity_type_id".into(), Value::Int(entity_type_id));
    row.insert("attribute_code".into(), Value::Text(code.into()));
    row
}

fn source_store(rows: Vec<RawRow>) -> Arc<MemoryStore> {
    let store = MemoryStore::new("source", 2);
    store.create_document(
        "sales_order",
        ["entity_id", "store_id", "status", "coupon_code"],
        Some("entity_id"),
    );
    store.insert_rows("sales_order", rows).unwrap();
    Arc::new(store)
}

fn destination_store(metadata_rows: Vec<RawRow>) -> Arc<MemoryStore> {
    let store = MemoryStore::new("destination", 2);
    store.create_document(
        "sales_order",
        ["entity_id", "store_id", "status", "coupon_code"],
        Some("entity_id"),
    );
    store.create_document("eav_entity_int", SINK_FIELDS, None);
    store.create_document(
        "eav_attribute",
        ["attribute_id", "entity_type_id", "attribute_code"],
        Some("attribute_id"),
    );
    store.insert_rows("eav_attribute", metadata_rows).unwrap();
    Arc::new(store)
}

fn four_orders() -> Vec<RawRow> {
    vec![
        order(100, Some(1), Some("SAVE10")),
        order(101, Some(1), None),
        order(102, Some(2), Some("")),
        order(103, Some(2), None),
    ]
}

fn sink_row(attribute_id: i64, entity_type_id: i64, store_id: i64, entity_id: i64, value: &str) -> RawRow {
    let mut row = RawRow::new();
    row.insert("attribute_id".into(), Value::Int(attribute_id));
    row.insert("entity_type_id".into(), Value::Int(entity_type_id));
    row.insert("store_id".into(), Value::Int(store_id));
    row.insert("entity_id".into(), Value::Int(entity_id));
    row.insert("value".into(), Value::Text(value.into()));
    row
}

#[tokio::test]
async fn test_two_pages_with_one_coupon() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);

    let result = Orchestrator::new(config(), source.clone(), destination.clone())
        .perform()
        .await
        .unwrap();

    assert_eq!(destination.rows("sales_order").len(), 4);
    assert_eq!(
        destination.rows("eav_entity_int"),
        vec![sink_row(42, 3, 1, 100, "SAVE10")]
    );
    assert_eq!(result.rows_migrated, 4);
    assert_eq!(result.attribute_rows, 1);
    assert_eq!(result.documents_migrated, 1);
    assert_eq!(result.derivation.values_absent, 3);
}

#[tokio::test]
async fn test_destination_rows_follow_source_order() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);

    Orchestrator::new(config(), source.clone(), destination.clone())
        .perform()
        .await
        .unwrap();

    assert_eq!(destination.rows("sales_order"), source.rows("sales_order"));
}

#[tokio::test]
async fn test_duplicate_metadata_resolves_to_first() {
    let mut orders = four_orders();
    orders[3] = order(103, Some(2), Some("WELCOME"));
    let source = source_store(orders);
    let destination = destination_store(vec![
        metadata("status", 1, 3),
        metadata("coupon_code", 42, 3),
        metadata("coupon_code", 99, 3),
    ]);

    Orchestrator::new(config(), source, destination.clone())
        .perform()
        .await
        .unwrap();

    let ids: Vec<Value> = destination
        .rows("eav_entity_int")
        .into_iter()
        .map(|r| r["attribute_id"].clone())
        .collect();
    assert_eq!(ids, vec![Value::Int(42), Value::Int(42)]);
}

#[tokio::test]
async fn test_rerun_gives_identical_destination() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);
    let orchestrator = Orchestrator::new(config(), source, destination.clone());

    orchestrator.perform().await.unwrap();
    let first = destination.rows("sales_order");
    let first_sink = destination.rows("eav_entity_int");
    assert_eq!(first_sink, vec![sink_row(42, 3, 1, 100, "SAVE10")]);

    orchestrator.perform().await.unwrap();
    assert_eq!(destination.rows("sales_order"), first);
    assert_eq!(destination.rows("eav_entity_int"), first_sink);
}

#[tokio::test]
async fn test_rerun_keeps_rows_of_other_attributes() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);
    let unrelated = sink_row(7, 5, 1, 100, "120");
    destination
        .insert_rows("eav_entity_int", vec![sink_row(42, 3, 1, 100, "OLD"), unrelated.clone()])
        .unwrap();

    Orchestrator::new(config(), source, destination.clone())
        .perform()
        .await
        .unwrap();

    assert_eq!(
        destination.rows("eav_entity_int"),
        vec![unrelated, sink_row(42, 3, 1, 100, "SAVE10")]
    );
}

#[tokio::test]
async fn test_unmapped_document_is_skipped() {
    let yaml = CONFIG.replace("documents: [sales_order]", "documents: [sales_order, sales_flat_quote]");
    let config = Config::from_yaml(&yaml).unwrap();
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);

    let result = Orchestrator::new(config, source.clone(), destination.clone())
        .perform()
        .await
        .unwrap();

    assert_eq!(result.skipped_documents, vec!["sales_flat_quote".to_string()]);
    assert_eq!(source.page_fetches("sales_flat_quote"), 0);
}

#[tokio::test]
async fn test_missing_metadata_writes_no_attribute_rows() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("status", 1, 3)]);

    let result = Orchestrator::new(config(), source, destination.clone())
        .perform()
        .await
        .unwrap();

    assert_eq!(destination.rows("sales_order").len(), 4);
    assert!(destination.rows("eav_entity_int").is_empty());
    assert_eq!(result.derivation.metadata_missing, 1);
}

#[tokio::test]
async fn test_missing_store_id_is_counted_not_fatal() {
    let source = source_store(vec![
        order(100, None, Some("SAVE10")),
        order(101, Some(1), Some("SPRING")),
    ]);
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);

    let result = Orchestrator::new(config(), source, destination.clone())
        .perform()
        .await
        .unwrap();

    assert_eq!(
        destination.rows("eav_entity_int"),
        vec![sink_row(42, 3, 1, 101, "SPRING")]
    );
    assert_eq!(result.derivation.missing_join_keys, 1);
    assert_eq!(destination.rows("sales_order").len(), 2);
}

#[tokio::test]
async fn test_save_failure_keeps_earlier_pages_and_marks_failed() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);
    destination.fail_save_at("sales_order", 1);
    let state_dir = tempfile::tempdir().unwrap();
    let state_path = state_dir.path().join("state.json");

    let err = Orchestrator::new(config(), source, destination.clone())
        .with_state_file(state_path.clone())
        .perform()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Save { page: 1, .. }));
    assert_eq!(destination.rows("sales_order").len(), 2);
    assert_eq!(destination.rows("eav_entity_int").len(), 1);

    let state = MigrationState::load(&state_path).unwrap();
    assert_eq!(state.documents["sales_order"].status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_missing_destination_document_is_fatal() {
    let source = source_store(four_orders());
    let destination = Arc::new(MemoryStore::new("destination", 2));

    let err = Orchestrator::new(config(), source, destination)
        .perform()
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::DocumentNotFound(_)));
}

#[tokio::test]
async fn test_no_fetch_after_first_empty_page() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);

    Orchestrator::new(config(), source.clone(), destination.clone())
        .perform()
        .await
        .unwrap();

    // two full pages, then the terminating empty page
    assert_eq!(source.page_fetches("sales_order"), 3);
    // the metadata index is built from one scan: one page plus the empty page
    assert_eq!(destination.page_fetches("eav_attribute"), 2);
}

struct CountingFactory {
    inits: Arc<AtomicUsize>,
}

struct CountingTransformer {
    inits: Arc<AtomicUsize>,
}

impl RecordTransformer for CountingTransformer {
    fn init(&mut self) -> sales_order_migrate::Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn transform(&self, source: &Record, destination: &mut Record) -> sales_order_migrate::Result<()> {
        for (field, value) in source.data() {
            destination.set_value(field, value.clone())?;
        }
        Ok(())
    }
}

impl TransformerFactory for CountingFactory {
    fn create(
        &self,
        _source: &Document,
        _destination: &Document,
        _map_reader: Arc<dyn MapReader>,
    ) -> Box<dyn RecordTransformer> {
        Box::new(CountingTransformer {
            inits: self.inits.clone(),
        })
    }
}

#[tokio::test]
async fn test_transformer_initialised_once_per_document() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);
    let inits = Arc::new(AtomicUsize::new(0));

    Orchestrator::new(config(), source, destination)
        .with_transformer_factory(Arc::new(CountingFactory {
            inits: inits.clone(),
        }))
        .perform()
        .await
        .unwrap();

    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

/// Copies records through, failing on the `fail_on`-th record (zero-based).
struct FailingTransformer {
    fail_on: usize,
    seen: AtomicUsize,
}

impl RecordTransformer for FailingTransformer {
    fn init(&mut self) -> sales_order_migrate::Result<()> {
        Ok(())
    }

    fn transform(&self, source: &Record, destination: &mut Record) -> sales_order_migrate::Result<()> {
        if self.seen.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(MigrateError::transform(
                destination.document().name(),
                "coupon_code cannot be converted",
            ));
        }
        for (field, value) in source.data() {
            destination.set_value(field, value.clone())?;
        }
        Ok(())
    }
}

struct FailingFactory {
    fail_on: usize,
}

impl TransformerFactory for FailingFactory {
    fn create(
        &self,
        _source: &Document,
        _destination: &Document,
        _map_reader: Arc<dyn MapReader>,
    ) -> Box<dyn RecordTransformer> {
        Box::new(FailingTransformer {
            fail_on: self.fail_on,
            seen: AtomicUsize::new(0),
        })
    }
}

#[tokio::test]
async fn test_transform_failure_aborts_run_and_marks_failed() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);
    let state_dir = tempfile::tempdir().unwrap();
    let state_path = state_dir.path().join("state.json");

    let err = Orchestrator::new(config(), source, destination.clone())
        .with_transformer_factory(Arc::new(FailingFactory { fail_on: 2 }))
        .with_state_file(state_path.clone())
        .perform()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Transform { .. }));
    assert_eq!(
        destination.rows("sales_order"),
        vec![
            order(100, Some(1), Some("SAVE10")),
            order(101, Some(1), None),
        ]
    );
    assert_eq!(
        destination.rows("eav_entity_int"),
        vec![sink_row(42, 3, 1, 100, "SAVE10")]
    );

    let state = MigrationState::load(&state_path).unwrap();
    assert_eq!(state.documents["sales_order"].status, TaskStatus::Failed);
    assert!(state.documents["sales_order"]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("coupon_code cannot be converted")));
}

#[tokio::test]
async fn test_progress_modes() {
    let coarse = Arc::new(LogProgress::new(1));
    Orchestrator::new(
        config(),
        source_store(four_orders()),
        destination_store(vec![metadata("coupon_code", 42, 3)]),
    )
    .with_progress(coarse.clone(), ProgressMode::Document)
    .perform()
    .await
    .unwrap();
    assert_eq!(coarse.position(), 1);

    let rows = Arc::new(LogProgress::new(1));
    Orchestrator::new(
        config(),
        source_store(four_orders()),
        destination_store(vec![metadata("coupon_code", 42, 3)]),
    )
    .with_progress(rows.clone() as Arc<dyn ProgressReporter>, ProgressMode::Row)
    .perform()
    .await
    .unwrap();
    assert_eq!(rows.position(), 4);
}

#[tokio::test]
async fn test_rollback_is_impossible() {
    let orchestrator = Orchestrator::new(
        config(),
        source_store(Vec::new()),
        destination_store(Vec::new()),
    );
    assert!(!orchestrator.supports_rollback());
    let err = orchestrator.rollback().await.unwrap_err();
    assert_eq!(err.to_string(), "Rollback is impossible");
}

#[tokio::test]
async fn test_validate_counts_after_run() {
    let source = source_store(four_orders());
    let destination = destination_store(vec![metadata("coupon_code", 42, 3)]);
    let orchestrator = Orchestrator::new(config(), source, destination.clone());

    let before = orchestrator.validate().await.unwrap();
    assert!(!before["sales_order"].matches());

    orchestrator.perform().await.unwrap();
    let after = orchestrator.validate().await.unwrap();
    assert!(after["sales_order"].matches());
    assert_eq!(destination.get_records_count("sales_order").await.unwrap(), 4);
}
