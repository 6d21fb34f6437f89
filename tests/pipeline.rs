//! Pipeline Integration Tests
//!
//! Tests for tree construction, ordering laws and error reporting.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use phototree::core::{FieldSource, RecordFields};
use phototree::{
    ClassificationFieldType, ClassificationPolicy, ClassificationReorderPolicy, Error, EvaluationError,
    EvaluationLimits, Evaluator, ExifInfo, PhotoInfo, PipelineEngine, Policies, PolicyFunction,
    ReorderItem, ReorderPolicy, Stage,
};

fn photo(id: &str, name: &str) -> PhotoInfo {
    PhotoInfo::new(id, name, ExifInfo::default(), "")
}

fn first_letter() -> ClassificationPolicy {
    ClassificationPolicy::by_name(PolicyFunction::script(
        "first letter",
        "data",
        "data.sub_string(0, 1).to_upper()",
    ))
}

fn level(classify: ClassificationPolicy, reorder: ReorderPolicy) -> ClassificationReorderPolicy {
    ClassificationReorderPolicy::new(classify, reorder)
}

fn sorted() -> ReorderPolicy {
    ReorderPolicy::with(PolicyFunction::lexicographic(false))
}

async fn run(policies: &Policies, photos: &[PhotoInfo]) -> phototree::PipelineOutput {
    PipelineEngine::default()
        .run(policies, photos, &RecordFields)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_first_letter_groups_sorted() {
    let policies = Policies::new(vec![level(first_letter(), sorted())], sorted());
    let photos = vec![
        photo("b", "B.jpg"),
        photo("a2", "a2.jpg"),
        photo("a", "A.jpg"),
    ];

    let output = run(&policies, &photos).await;

    let groups = output.tree.groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].label, "A");
    assert_eq!(groups[0].photo_ids, vec!["a", "a2"]);
    assert_eq!(groups[1].label, "B");
    assert_eq!(groups[1].photo_ids, vec!["b"]);

    assert_eq!(output.result_for("a2").unwrap().labels(), &["A"]);
    assert_eq!(output.tree.photo_ids(), vec!["a", "a2", "b"]);
}

#[tokio::test]
async fn test_identity_reorder_keeps_first_seen_order() {
    let by_ext = ClassificationPolicy::by_name(PolicyFunction::regex_extract(r"\.[a-z]+$"));
    let policies = Policies::new(
        vec![level(by_ext, ReorderPolicy::identity())],
        ReorderPolicy::identity(),
    );
    let photos = vec![
        photo("1", "z.png"),
        photo("2", "a.jpg"),
        photo("3", "m.png"),
        photo("4", "b.jpg"),
    ];

    let output = run(&policies, &photos).await;

    let labels: Vec<_> = output.tree.groups().iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, vec![".png", ".jpg"]);
    assert_eq!(output.tree.groups()[0].photo_ids, vec!["1", "3"]);
    assert_eq!(output.tree.groups()[1].photo_ids, vec!["2", "4"]);
}

#[tokio::test]
async fn test_scripted_reorder_is_permutation() {
    let reverse = ReorderPolicy::with(PolicyFunction::script("reverse", "items", "items.reverse(); items"));
    let policies = Policies::new(vec![level(first_letter(), reverse.clone())], reverse);
    let photos = vec![
        photo("1", "apple.jpg"),
        photo("2", "banana.jpg"),
        photo("3", "avocado.jpg"),
        photo("4", "cherry.jpg"),
    ];

    let output = run(&policies, &photos).await;

    let labels: Vec<_> = output.tree.groups().iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, vec!["C", "B", "A"]);
    assert_eq!(output.tree.groups()[2].photo_ids, vec!["3", "1"]);

    let mut ids = output.tree.photo_ids();
    ids.sort_unstable();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_every_result_has_one_label_per_level() {
    let policies = Policies::new(
        vec![
            level(first_letter(), sorted()),
            level(
                ClassificationPolicy::by_exif("Model", PolicyFunction::passthrough()),
                sorted(),
            ),
            level(
                ClassificationPolicy::by_name(PolicyFunction::regex_extract(r"\d+")),
                ReorderPolicy::with(PolicyFunction::numeric(false)),
            ),
        ],
        sorted(),
    );
    let photos: Vec<_> = [("1", "a10.jpg", "X100V"), ("2", "a9.jpg", "X100V"), ("3", "b.jpg", "GR3")]
        .into_iter()
        .map(|(id, name, model)| PhotoInfo::new(id, name, ExifInfo::new([("Model", model)]), ""))
        .collect();

    let output = run(&policies, &photos).await;

    assert_eq!(output.tree.depth, 3);
    assert_eq!(output.results.len(), 3);
    for result in &output.results {
        assert_eq!(result.labels().len(), 3);
    }
    for leaf in output.tree.leaves() {
        assert_eq!(leaf.path.len(), 3);
    }

    // numeric order puts 9 before 10; no digits falls back to "other"
    assert_eq!(output.result_for("2").unwrap().labels(), &["A", "X100V", "9"]);
    assert_eq!(output.result_for("3").unwrap().labels(), &["B", "GR3", "other"]);
    assert_eq!(output.tree.photo_ids(), vec!["2", "1", "3"]);
}

#[tokio::test]
async fn test_zero_levels_orders_single_leaf() {
    let policies = Policies::new(Vec::new(), sorted());
    let photos = vec![photo("1", "c.jpg"), photo("2", "a.jpg"), photo("3", "b.jpg")];

    let output = run(&policies, &photos).await;

    assert_eq!(output.tree.depth, 0);
    let leaves = output.tree.leaves();
    assert_eq!(leaves.len(), 1);
    assert!(leaves[0].path.is_empty());
    assert_eq!(leaves[0].photo_ids, vec!["2", "3", "1"]);
    assert!(output.results.iter().all(|r| r.labels().is_empty()));
}

#[tokio::test]
async fn test_default_policies_keep_input_order() {
    let photos = vec![photo("1", "c.jpg"), photo("2", "a.jpg")];
    let output = run(&Policies::default(), &photos).await;
    assert_eq!(output.tree.photo_ids(), vec!["1", "2"]);
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let policies = Policies::new(vec![level(first_letter(), sorted())], sorted());
    let photos: Vec<_> = (0..20)
        .map(|i| photo(&format!("p{}", i), &format!("{}{}.jpg", ["x", "y", "z"][i % 3], i)))
        .collect();

    let first = run(&policies, &photos).await;
    let second = run(&policies, &photos).await;
    assert_eq!(first.tree, second.tree);
    assert_eq!(first.results, second.results);
}

#[tokio::test]
async fn test_empty_label_is_its_own_group() {
    let blank_for_x = ClassificationPolicy::by_name(PolicyFunction::script(
        "blank",
        "data",
        r#"if data.starts_with("x") { "" } else { "named" }"#,
    ));
    let policies = Policies::new(vec![level(blank_for_x, sorted())], sorted());
    let photos = vec![photo("1", "a.jpg"), photo("2", "x.jpg")];

    let output = run(&policies, &photos).await;

    let groups = output.tree.groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].label, "");
    assert_eq!(groups[0].photo_ids, vec!["2"]);
    assert_eq!(output.result_for("2").unwrap().labels(), &[""]);
}

#[tokio::test]
async fn test_empty_photo_set() {
    let policies = Policies::new(vec![level(first_letter(), sorted())], sorted());
    let output = run(&policies, &[]).await;

    assert!(output.tree.is_empty());
    assert!(output.tree.leaves().is_empty());
    assert!(output.results.is_empty());
}

#[tokio::test]
async fn test_missing_exif_tag_fails_run() {
    let policies = Policies::new(
        vec![level(
            ClassificationPolicy::by_exif("LensModel", PolicyFunction::passthrough()),
            sorted(),
        )],
        sorted(),
    );
    let err = PipelineEngine::default()
        .run(&policies, &[photo("p1", "a.jpg")], &RecordFields)
        .await
        .unwrap_err();

    match err {
        Error::MissingField { photo_id, field } => {
            assert_eq!(photo_id, "p1");
            assert_eq!(field, "exif:LensModel");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_script_timeout_reports_stage() {
    let spin = ClassificationPolicy::by_name(PolicyFunction::script("spin", "data", "loop { }"));
    let policies = Policies::new(vec![level(spin, sorted())], sorted());
    let limits = EvaluationLimits::default()
        .with_timeout_ms(50)
        .with_max_operations(0);

    let err = PipelineEngine::new(Evaluator::new(limits))
        .run(&policies, &[photo("p1", "a.jpg")], &RecordFields)
        .await
        .unwrap_err();

    match err {
        Error::Evaluation { stage, subject, source } => {
            assert_eq!(stage, Stage::Level(0));
            assert_eq!(subject, "photo p1");
            assert_eq!(source, EvaluationError::Timeout { limit_ms: 50 });
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_script_fails_before_any_evaluation() {
    let broken = ClassificationPolicy::by_name(PolicyFunction::script("broken", "data", "fn ("));
    let source = CountingSource::default();
    let policies = Policies::new(
        vec![level(
            ClassificationPolicy::new(ClassificationFieldType::Property, "stem", PolicyFunction::passthrough()),
            sorted(),
        ), level(broken, sorted())],
        sorted(),
    );

    let err = PipelineEngine::default()
        .run(&policies, &[photo("p1", "a.jpg")], &source)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Evaluation { stage: Stage::Level(1), .. }));
    assert_eq!(source.property_calls.load(Ordering::SeqCst), 0);
}

#[derive(Default)]
struct CountingSource {
    property_calls: AtomicUsize,
}

#[async_trait]
impl FieldSource for CountingSource {
    async fn property(&self, photo: &PhotoInfo, name: &str) -> phototree::Result<Option<String>> {
        self.property_calls.fetch_add(1, Ordering::SeqCst);
        RecordFields.property(photo, name).await
    }

    async fn content(&self, photo: &PhotoInfo) -> phototree::Result<Vec<u8>> {
        Ok(photo.file_name.as_bytes().to_vec())
    }
}

#[tokio::test]
async fn test_fields_extracted_once_per_photo() {
    let by_stem = || {
        ClassificationPolicy::new(
            ClassificationFieldType::Property,
            "stem",
            PolicyFunction::script("len", "data", "if data.len() > 3 { \"long\" } else { \"short\" }"),
        )
    };
    let by_content = ClassificationPolicy::new(
        ClassificationFieldType::Content,
        "",
        PolicyFunction::regex_extract(r"^[A-Za-z0-9+/]{2}"),
    );
    let policies = Policies::new(
        vec![
            level(by_stem(), sorted()),
            level(by_stem(), sorted()),
            level(by_content, sorted()),
        ],
        sorted(),
    );
    let photos = vec![photo("1", "ab.jpg"), photo("2", "abcdef.jpg"), photo("3", "xyz.jpg")];
    let source = CountingSource::default();

    let output = PipelineEngine::default()
        .run(&policies, &photos, &source)
        .await
        .unwrap();

    assert_eq!(source.property_calls.load(Ordering::SeqCst), 3);
    assert_eq!(output.stats.classify_calls, 9);
    assert_eq!(output.stats.field_extractions, 6);
    assert_eq!(output.result_for("2").unwrap().labels()[0], "long");
}

#[test]
fn test_standalone_reorder() {
    let items = vec![
        ReorderItem::new("a", "img10"),
        ReorderItem::new("b", "img2"),
        ReorderItem::new("c", "cover"),
    ];
    let out = ReorderPolicy::with(PolicyFunction::numeric(false))
        .evaluate(&Evaluator::default(), &items)
        .unwrap();
    let ids: Vec<_> = out.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a", "c"]);
}
