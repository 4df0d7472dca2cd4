use lms_schema::{
    Check, Error, JournalEntry, Outcome, Reconciler, StepOutcome, VirtualSchema,
    reconcile_session,
};

/// The pre-repair LMS schema: `content` without the three new columns or any
/// foreign keys, plus the tables the keys point at.
fn legacy_schema() -> VirtualSchema {
    VirtualSchema::new("steamlms")
        .with_table("content", &["id", "title", "grade_id", "category_id", "created_at"])
        .with_primary_key("content")
        .with_table("grades", &["id", "name"])
        .with_primary_key("grades")
        .with_table("categories", &["id", "name"])
        .with_primary_key("categories")
        .with_table("subcategories", &["id", "category_id", "name"])
        .with_primary_key("subcategories")
}

fn with_files(schema: VirtualSchema) -> VirtualSchema {
    schema
        .with_table("files", &["id", "name", "type", "url"])
        .with_primary_key("files")
}

#[tokio::test]
async fn test_fresh_run_applies_everything_in_order() {
    let mut schema = with_files(legacy_schema());
    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;

    assert_eq!(report.outcome(), Outcome::Success);
    assert_eq!(
        report.outcomes(),
        vec![&StepOutcome::Applied; 5],
        "{:#?}",
        report.steps
    );
    assert_eq!(
        schema.columns("content").unwrap(),
        [
            "id",
            "title",
            "grade_id",
            "category_id",
            "subcategory_id",
            "content_type",
            "content",
            "created_at",
        ]
    );
    assert_eq!(
        schema.constraints("content").unwrap(),
        [
            "PRIMARY",
            "fk_content_grade",
            "fk_content_category",
            "fk_content_subcategory",
        ]
    );
    assert_eq!(
        schema.columns("files").unwrap(),
        ["id", "name", "type", "content_id", "url"]
    );
    assert_eq!(schema.executed().len(), 7);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let mut schema = with_files(legacy_schema());
    let reconciler = Reconciler::content_repair();

    reconcile_session(&mut schema, &reconciler).await;
    let after_first = schema.clone();
    let executed_first = schema.executed().len();

    let report = reconcile_session(&mut schema, &reconciler).await;
    assert!(report.is_success());
    assert_eq!(report.outcomes(), vec![&StepOutcome::AlreadyPresent; 5]);
    assert!(schema.same_structure(&after_first));
    assert_eq!(schema.executed().len(), executed_first, "no redundant DDL");
}

#[tokio::test]
async fn test_missing_files_table_is_skipped() {
    let reconciler = Reconciler::content_repair();
    let mut schema = legacy_schema();

    let report = reconcile_session(&mut schema, &reconciler).await;
    assert_eq!(report.outcome(), Outcome::Success);
    assert_eq!(
        report.steps[4].outcome,
        StepOutcome::Skipped("table files does not exist".to_string())
    );
    assert!(!schema.has_table("files"));

    // Still skipped, not failed, on the next run.
    let report = reconcile_session(&mut schema, &reconciler).await;
    assert!(report.is_success());
    let outcomes = report.outcomes();
    assert_eq!(outcomes[..4], vec![&StepOutcome::AlreadyPresent; 4]);
    assert!(matches!(outcomes[4], StepOutcome::Skipped(_)));
}

#[tokio::test]
async fn test_missing_referenced_table_is_fatal_and_not_rolled_back() {
    let mut schema = VirtualSchema::new("steamlms")
        .with_table("content", &["id", "grade_id", "category_id"])
        .with_primary_key("content")
        .with_table("categories", &["id"])
        .with_table("subcategories", &["id"])
        .with_table("files", &["id", "type"]);

    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;

    assert_eq!(report.outcome(), Outcome::Failure);
    assert_eq!(report.outcomes(), vec![&StepOutcome::Applied; 3]);
    assert_eq!(report.not_run(), 1);

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.step, "ensure content foreign keys");
    match &failure.error {
        Error::Mutation { sql, message } => {
            assert!(sql.contains("`fk_content_grade`"), "{sql}");
            assert_eq!(message, "Failed to open the referenced table 'grades'");
        }
        other => panic!("expected a mutation error, got {other:?}"),
    }

    // Steps 1-3 stay applied; no foreign key was added; files untouched.
    assert_eq!(
        schema.columns("content").unwrap(),
        ["id", "grade_id", "category_id", "subcategory_id", "content_type", "content"]
    );
    assert_eq!(schema.constraints("content").unwrap(), ["PRIMARY"]);
    assert_eq!(schema.columns("files").unwrap(), ["id", "type"]);
    assert_eq!(schema.release_count(), 1);
}

#[tokio::test]
async fn test_any_constraint_satisfies_foreign_key_step() {
    let mut schema = with_files(legacy_schema()).with_constraint("content", "uq_content_title");

    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;

    assert!(report.is_success());
    assert_eq!(report.steps[3].outcome, StepOutcome::AlreadyPresent);
    assert_eq!(
        schema.constraints("content").unwrap(),
        ["PRIMARY", "uq_content_title"]
    );
}

#[tokio::test]
async fn test_dropped_foreign_key_is_not_restored() {
    // Two of the three keys survive; the step still counts as satisfied.
    let mut schema = with_files(legacy_schema())
        .with_constraint("content", "fk_content_grade")
        .with_constraint("content", "fk_content_category");

    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;

    assert_eq!(report.steps[3].outcome, StepOutcome::AlreadyPresent);
    assert!(
        !schema
            .constraints("content")
            .unwrap()
            .iter()
            .any(|c| c == "fk_content_subcategory")
    );
}

#[tokio::test]
async fn test_released_exactly_once() {
    // success
    let mut schema = with_files(legacy_schema());
    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;
    assert!(report.is_success());
    assert_eq!(schema.release_count(), 1);
    assert_eq!(schema.journal().last(), Some(&JournalEntry::Release));

    // mutation failure
    let mut schema = VirtualSchema::new("steamlms").with_table("content", &["id"]);
    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;
    assert!(matches!(
        report.failure.as_ref().map(|f| &f.error),
        Some(Error::Mutation { .. })
    ));
    assert_eq!(schema.release_count(), 1);
    assert_eq!(schema.journal().last(), Some(&JournalEntry::Release));

    // introspection failure
    let mut schema = legacy_schema().fail_lookups("Lost connection to MySQL server during query");
    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;
    assert!(matches!(
        report.failure.as_ref().map(|f| &f.error),
        Some(Error::Introspection { .. })
    ));
    assert_eq!(schema.release_count(), 1);
}

#[tokio::test]
async fn test_introspection_failure_aborts_before_any_ddl() {
    let mut schema = legacy_schema().fail_lookups("Lost connection to MySQL server during query");
    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;

    assert_eq!(report.outcome(), Outcome::Failure);
    assert!(report.steps.is_empty());
    assert_eq!(report.not_run(), 4);
    let failure = report.failure.unwrap();
    assert_eq!(
        failure.error.message(),
        "Lost connection to MySQL server during query"
    );
    assert!(schema.executed().is_empty());
}

#[tokio::test]
async fn test_every_action_follows_a_fresh_check() {
    let mut schema = with_files(legacy_schema());
    reconcile_session(&mut schema, &Reconciler::content_repair()).await;

    let journal = schema.journal();
    let lookups: Vec<&Check> = journal
        .iter()
        .filter_map(|e| match e {
            JournalEntry::Lookup(check) => Some(check),
            _ => None,
        })
        .collect();
    assert_eq!(
        lookups,
        [
            &Check::column("content", "subcategory_id"),
            &Check::column("content", "content_type"),
            &Check::column("content", "content"),
            &Check::non_primary_constraint("content"),
            &Check::table("files"),
            &Check::column("files", "content_id"),
        ]
    );

    // Each step's statements come right after its own check.
    for (i, entry) in journal.iter().enumerate() {
        if let JournalEntry::Applied(sql) = entry {
            let previous_lookup = journal[..i]
                .iter()
                .rev()
                .find_map(|e| match e {
                    JournalEntry::Lookup(check) => Some(check),
                    _ => None,
                })
                .unwrap();
            match previous_lookup {
                Check::Column { table, column } => {
                    assert!(sql.contains(&format!("`{table}` ADD COLUMN `{column}`")), "{sql}");
                }
                Check::NonPrimaryConstraint { .. } => assert!(sql.contains("FOREIGN KEY")),
                Check::Table { .. } => panic!("no statement follows a table check directly"),
            }
        }
    }
}

#[tokio::test]
async fn test_partial_state_only_adds_what_is_missing() {
    let mut schema = VirtualSchema::new("steamlms")
        .with_table(
            "content",
            &["id", "grade_id", "category_id", "subcategory_id", "body"],
        )
        .with_table("grades", &["id"])
        .with_table("categories", &["id"])
        .with_table("subcategories", &["id"]);

    let report = reconcile_session(&mut schema, &Reconciler::content_repair()).await;

    assert!(report.is_success());
    let outcomes = report.outcomes();
    assert_eq!(outcomes[0], &StepOutcome::AlreadyPresent);
    assert_eq!(outcomes[1], &StepOutcome::Applied);
    assert_eq!(outcomes[2], &StepOutcome::Applied);
    assert_eq!(outcomes[3], &StepOutcome::Applied);
    assert!(matches!(outcomes[4], StepOutcome::Skipped(_)));
    assert_eq!(
        schema.columns("content").unwrap(),
        [
            "id",
            "grade_id",
            "category_id",
            "subcategory_id",
            "content_type",
            "content",
            "body",
        ]
    );
}
