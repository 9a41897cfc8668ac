use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use media_parser::{Cache, MediaError, MediaRecord, MediaType, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const MOCK_URLS: &[&str] = &[
    "https://xkcd.com/1479",
    "https://twitter.com/caiosba/status/742779467521773568",
    "https://www.youtube.com/watch?v=mtLxD7r4BZQ",
    "https://www.instagram.com/p/BJwkn34AqtN/",
    "https://www.facebook.com/teste637621352/posts/1028416870556238",
];

fn create_mock_record(url: &str) -> MediaRecord {
    let mut record = MediaRecord::new(url, url, Provider::Page, MediaType::Item);
    record.fields.title = format!("Title for {url}");
    record.fields.description = format!("Description for {url}");
    record.fields.picture = "https://example.com/image.jpg".to_string();
    record
}

fn bench_cache_scenarios(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_performance");
    group
        .sample_size(100)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));

    for cache_size in [100, 500, 1000] {
        group.bench_with_input(
            BenchmarkId::new("cache_hit", cache_size),
            &cache_size,
            |b, &size| {
                let cache = Cache::new(size);
                for url in MOCK_URLS {
                    cache.put(*url, create_mock_record(url));
                }
                b.iter(|| black_box(cache.get(MOCK_URLS[0])));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("cache_write", cache_size),
            &cache_size,
            |b, &size| {
                let cache = Cache::new(size);
                let counter = AtomicUsize::new(0);
                b.iter(|| {
                    let current = counter.fetch_add(1, Ordering::Relaxed);
                    let url = MOCK_URLS[current % MOCK_URLS.len()];
                    cache.put(format!("{url}?n={current}"), create_mock_record(url));
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("shared_init", cache_size),
            &cache_size,
            |b, &size| {
                b.to_async(&rt).iter(|| async move {
                    let cache = Cache::new(size);
                    let computations = Arc::new(AtomicUsize::new(0));
                    let lookups = (0..16).map(|_| {
                        let computations = computations.clone();
                        let cache = cache.clone();
                        async move {
                            cache
                                .get_or_try_init(MOCK_URLS[0], || async move {
                                    computations.fetch_add(1, Ordering::SeqCst);
                                    Ok::<_, MediaError>(create_mock_record(MOCK_URLS[0]))
                                })
                                .await
                        }
                    });
                    futures::future::join_all(lookups).await;
                    black_box(computations.load(Ordering::SeqCst))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_cache_scenarios);
criterion_main!(benches);
