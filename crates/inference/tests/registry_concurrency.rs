use inference::{
    BoundingBox, Detection, InferenceConfig, InferenceService, ModelRegistry, OutputFormat,
    testing::{FixedModel, StaticLoader, encoded_image},
};
use std::{collections::HashSet, sync::Arc, thread, time::Duration};

fn labelled(label: &str) -> FixedModel {
    FixedModel::new(vec![Detection::new(
        BoundingBox::new(10.0, 10.0, 50.0, 50.0),
        label,
        0.8,
    )])
}

/// A malformed or unknown second load leaves the first model active.
#[tokio::test]
async fn test_second_invalid_load_keeps_first_model() {
    let loader = StaticLoader::new()
        .with_model("first", labelled("a"))
        .with_malformed("corrupt", "truncated protobuf");
    let registry = Arc::new(ModelRegistry::new(Arc::new(loader)));
    let service = InferenceService::new(registry, InferenceConfig::test_default());

    let loaded = service.load_model("first").await.unwrap();
    assert_eq!(loaded.generation, 1);

    let err = service.load_model("corrupt").await.unwrap_err();
    assert!(!err.is_not_found());
    assert!(err.to_string().contains("truncated protobuf"));

    let err = service.load_model("does-not-exist").await.unwrap_err();
    assert!(err.is_not_found());

    let status = service.status();
    assert_eq!(status.model_name.as_deref(), Some("first"));
    assert_eq!(status.generation, Some(1));

    let outcome = service
        .detect(encoded_image(64, 64, OutputFormat::Png), None)
        .await
        .unwrap();
    assert_eq!(outcome.model_name, "first");
}

/// `yolov8n.pt` loads, a second load with a bad name fails, and detect
/// keeps answering with the first model.
#[tokio::test]
async fn test_legacy_suffix_load_then_invalid_name() {
    let loader = StaticLoader::new().with_model("yolov8n", labelled("yolov8n"));
    let registry = Arc::new(ModelRegistry::new(Arc::new(loader)));
    let service = InferenceService::new(registry, InferenceConfig::test_default());

    let first = service.load_model("yolov8n.pt").await.unwrap();
    assert_eq!(first.name, "yolov8n");

    assert!(service.load_model("yolov9z.pt").await.is_err());

    let outcome = service
        .detect(encoded_image(64, 64, OutputFormat::Jpeg), None)
        .await
        .unwrap();
    assert_eq!(outcome.model_name, "yolov8n");
    assert_eq!(outcome.generation, first.generation);
    assert_eq!(outcome.detections[0].label, "yolov8n");
}

/// Detects issued while a slow load is in flight all succeed, each against
/// exactly one model, and the ones issued after the swap see the new model.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_detects_during_load_use_one_model_each() {
    let loader = Arc::new(
        StaticLoader::new()
            .with_model("old", labelled("old").with_delay(Duration::from_millis(20)))
            .with_model("new", labelled("new").with_delay(Duration::from_millis(20)))
            .with_load_delay(Duration::from_millis(150)),
    );
    let registry = Arc::new(ModelRegistry::new(loader.clone()));
    let service = InferenceService::new(registry, InferenceConfig::test_default());

    service.load_model("old").await.unwrap();
    assert_eq!(loader.loads_started(), 1);

    let swap = {
        let service = service.clone();
        tokio::spawn(async move { service.load_model("new").await })
    };
    while loader.loads_started() < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let upload = encoded_image(96, 96, OutputFormat::Png);
    let spawn_detect = |service: InferenceService, upload: Vec<u8>| {
        tokio::spawn(async move { service.detect(upload, None).await })
    };

    // The load is sleeping inside the loader; the slot still holds "old"
    assert_eq!(service.status().model_name.as_deref(), Some("old"));
    let mut during = Vec::new();
    while !swap.is_finished() {
        during.push(spawn_detect(service.clone(), upload.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let loaded = swap.await.unwrap().unwrap();
    assert_eq!(loaded.name, "new");
    assert!(!during.is_empty(), "no detect ran while the load was in flight");

    let after: Vec<_> = (0..4)
        .map(|_| spawn_detect(service.clone(), upload.clone()))
        .collect();

    let mut seen = HashSet::new();
    for request in during {
        let outcome = request.await.unwrap().unwrap();
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(
            outcome.detections[0].label, outcome.model_name,
            "detections must come from the model the request reports"
        );
        seen.insert(outcome.model_name);
    }
    assert!(seen.contains("old"));

    for request in after {
        let outcome = request.await.unwrap().unwrap();
        assert_eq!(outcome.model_name, "new");
        assert_eq!(outcome.generation, loaded.generation);
        assert_eq!(outcome.detections[0].label, "new");
    }
}

/// A handle observed before a swap keeps working after it.
#[test]
fn test_in_flight_handle_survives_swap() {
    let loader = StaticLoader::new()
        .with_model("old", labelled("old"))
        .with_model("new", labelled("new"));
    let registry = Arc::new(ModelRegistry::new(Arc::new(loader)));
    registry.load_and_swap("old").unwrap();

    let held = registry.current().unwrap();
    let replaced = registry.load_and_swap("new").unwrap();

    let image = inference::testing::solid_image(64, 64, [0, 0, 0]);
    assert_eq!(held.infer(&image).unwrap()[0].label, "old");
    assert_eq!(replaced.infer(&image).unwrap()[0].label, "new");
    assert_eq!(registry.current().unwrap().name, "new");
}

/// Racing loads settle on the handle installed by the last swap; every other
/// handle is returned as superseded exactly once.
#[test]
fn test_racing_loads_last_writer_wins() {
    let loader = StaticLoader::new()
        .with_model("a", labelled("a"))
        .with_model("b", labelled("b"))
        .with_model("c", labelled("c"));
    let registry = Arc::new(ModelRegistry::new(Arc::new(loader)));

    let threads: Vec<_> = ["a", "b", "c", "a", "b", "c"]
        .into_iter()
        .map(|name| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let handle = registry.load(name).unwrap();
                let previous = registry.swap(Arc::clone(&handle));
                (handle.generation, previous.map(|p| p.generation))
            })
        })
        .collect();

    let mut installed = HashSet::new();
    let mut superseded = Vec::new();
    let mut empty_slot_swaps = 0;
    for thread in threads {
        let (generation, previous) = thread.join().unwrap();
        installed.insert(generation);
        match previous {
            Some(previous) => superseded.push(previous),
            None => empty_slot_swaps += 1,
        }
    }
    assert_eq!(installed.len(), 6, "every load gets its own generation");
    assert_eq!(empty_slot_swaps, 1, "only the first swap sees an empty slot");

    // The swaps form one chain: each handle but the last is superseded once
    let unique: HashSet<u64> = superseded.iter().copied().collect();
    assert_eq!(unique.len(), superseded.len());
    let never_superseded: Vec<u64> = installed.difference(&unique).copied().collect();
    assert_eq!(never_superseded.len(), 1);

    let active = registry.current().unwrap();
    assert_eq!(active.generation, never_superseded[0]);
    let image = inference::testing::solid_image(8, 8, [0, 0, 0]);
    assert_eq!(active.infer(&image).unwrap()[0].label, active.name);
}
