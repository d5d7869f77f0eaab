use std::collections::HashSet;
use std::time::Duration;

use folio::application::error::ContentError;
use folio::cache::{CacheConfig, CacheService, Validation};
use metrics_util::debugging::DebuggingRecorder;
use serial_test::serial;

type Service = CacheService<u32, ContentError>;

fn reject_odd(value: &u32) -> Validation {
    if value % 2 == 0 {
        Validation::Valid
    } else {
        Validation::invalid("odd")
    }
}

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = Service::new(&CacheConfig {
        capacity: 1,
        ttl: Duration::ZERO,
        stale_while_revalidate: Duration::from_secs(3600),
    });
    let policy = cache.policy();

    // miss + produce
    let first = cache
        .get_or_produce("docs:a:downloaded", policy, || async { Ok::<u32, ContentError>(2) })
        .await
        .expect("produced");
    assert_eq!(first, 2);

    // zero ttl: the next read is stale and refreshes in the background
    let stale = cache
        .get_or_produce("docs:a:downloaded", policy, || async { Ok::<u32, ContentError>(4) })
        .await
        .expect("stale value");
    assert_eq!(stale, 2);
    let _ = cache.settle("docs:a:downloaded").await;

    // capacity 1: a second key evicts the first
    cache
        .get_or_produce("docs:b:downloaded", policy, || async { Ok::<u32, ContentError>(6) })
        .await
        .expect("produced");

    // unretained value clears the key
    cache
        .get_or_produce(
            "docs:b:downloaded",
            policy.force_fresh(true).retain_when(|value| *value != 0),
            || async { Ok::<u32, ContentError>(0) },
        )
        .await
        .expect("empty value is returned");

    // produced value fails its shape check
    let err = cache
        .get_or_produce(
            "docs:c:downloaded",
            policy.validate_with(reject_odd),
            || async { Ok::<u32, ContentError>(3) },
        )
        .await
        .expect_err("odd values are invalid");
    assert!(matches!(err, ContentError::Validation { .. }));

    // fresh hit
    let fresh = Service::new(&CacheConfig::default());
    let fresh_policy = fresh.policy();
    fresh
        .get_or_produce("docs:d:downloaded", fresh_policy, || async { Ok::<u32, ContentError>(8) })
        .await
        .expect("produced");
    fresh
        .get_or_produce("docs:d:downloaded", fresh_policy, || async { Ok::<u32, ContentError>(10) })
        .await
        .expect("hit");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "folio_cache_hit_total",
        "folio_cache_stale_total",
        "folio_cache_miss_total",
        "folio_cache_evict_total",
        "folio_cache_self_heal_total",
        "folio_cache_validation_failure_total",
        "folio_cache_produce_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
