use attraction_itinerary::model::{Attraction, SearchResult};
use attraction_itinerary::result_cache::ResultCache;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{seq::SliceRandom, thread_rng};

fn search_result(size: usize) -> SearchResult {
    SearchResult::new(
        (0..size)
            .map(|i| Attraction {
                name: format!("attraction{}", i),
                ticket_price: if i % 3 == 0 { "Free".into() } else { "$10".into() },
                ..Default::default()
            })
            .collect(),
    )
}

// Name lookups against the cached search result, as done before every add
pub fn cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_cache_lookup");

    for size in [10usize, 100, 1000].iter() {
        let cache = ResultCache::new();
        cache.set_search_result(search_result(*size));

        let names: Vec<String> = (0..*size).map(|i| format!("attraction{}", i)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let mut rng = thread_rng();
            b.iter(|| {
                let name = names.choose(&mut rng).map(String::as_str).unwrap_or("missing");
                black_box(cache.with_search_result(|result| result.find(name)))
            });
        });
    }

    group.finish();
}

fn replace_benchmark(c: &mut Criterion) {
    let cache = ResultCache::new();
    let result = search_result(100);

    c.bench_function("result_cache_replace_100", |b| {
        b.iter(|| cache.set_search_result(black_box(result.clone())))
    });
}

criterion_group!(benches, cache_benchmark, replace_benchmark);
criterion_main!(benches);
