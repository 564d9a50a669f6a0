use simsearch::simsearch_match::BruteForceMatcher;
use simsearch::{
    CorpusEntry, CorpusSearch, FailurePolicy, FetchError, ImageFetcher, ImagePreprocessing, MemoryFetcher,
    RasterImage, SearchError, SearchOutcome,
};
use std::sync::Arc;
use std::time::Duration;

/// Rectangles of random gray levels and sizes on a mid-gray canvas
fn blocks(width: usize, height: usize, seed: u32) -> RasterImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let mut next = |m: usize| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 8) as usize % m
    };
    let mut data = vec![128u8; width * height * 3];
    let side = width.min(height);
    for _ in 0..60 {
        let (x0, y0) = (next(width - 8), next(height - 8));
        let (w, h) = (6 + next(side / 5), 6 + next(side / 5));
        let rgb = [next(256) as u8, next(256) as u8, next(256) as u8];
        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                let i = (y * width + x) * 3;
                data[i..i + 3].copy_from_slice(&rgb);
            }
        }
    }
    RasterImage::new(data, width, height).unwrap()
}

fn png(img: &RasterImage) -> Vec<u8> {
    ImagePreprocessing::encode_png(img).unwrap()
}

/// Corpus entries `(id, url)` with the image of each url stored in memory
fn corpus(images: &[(u64, &str, &RasterImage)]) -> (Vec<CorpusEntry>, MemoryFetcher) {
    let mut fetcher = MemoryFetcher::new();
    let entries = images
        .iter()
        .map(|(id, url, img)| {
            fetcher.insert(url, png(img));
            CorpusEntry::new(*id, format!("art {id}"), *url)
        })
        .collect();
    (entries, fetcher)
}

fn search_with(fetcher: impl ImageFetcher + 'static) -> CorpusSearch {
    CorpusSearch::builder()
        .threads(4)
        .fetcher(Arc::new(fetcher))
        .build()
        .unwrap()
}

fn found_id(outcome: &SearchOutcome) -> Option<u64> {
    outcome.best().map(|b| b.entry().id)
}

struct HangingFetcher;

impl ImageFetcher for HangingFetcher {
    fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        std::thread::sleep(Duration::from_secs(5));
        Ok(Vec::new())
    }
}

#[test]
fn test_exact_duplicate_wins() {
    let query = blocks(160, 140, 3);
    let (a, b, c) = (blocks(160, 140, 1), blocks(150, 150, 2), blocks(170, 130, 4));
    let (entries, fetcher) = corpus(&[
        (10, "mem://a.png", &a),
        (11, "mem://b.png", &b),
        (12, "mem://query.png", &query),
        (13, "mem://c.png", &c),
    ]);
    let search = search_with(fetcher);

    let report = search.search(&query, &entries).unwrap();
    assert_eq!(found_id(&report.outcome), Some(12));

    let scores: Vec<usize> = report.candidates.iter().map(|c| c.score).collect();
    assert_eq!(scores.len(), 4);
    for (i, s) in scores.iter().enumerate() {
        if i != 2 {
            assert!(scores[2] > *s, "duplicate {} vs entry {} {}", scores[2], i, s);
        }
    }

    let best = report.outcome.best().unwrap();
    assert_eq!(best.score(), best.matches.len());
    assert_eq!(best.query_keypoints.len(), best.matches.len());
}

#[test]
fn test_score_all_in_corpus_order() {
    let query = blocks(128, 128, 20);
    let (x, y) = (blocks(128, 128, 21), blocks(128, 128, 22));
    let (entries, fetcher) = corpus(&[(5, "mem://y", &y), (3, "mem://q", &query), (9, "mem://x", &x)]);
    let scores = search_with(fetcher).score_all(&query, &entries).unwrap();
    let ids: Vec<u64> = scores.iter().map(|c| c.entry.id).collect();
    assert_eq!(ids, vec![5, 3, 9]);
    assert!(scores.iter().enumerate().all(|(i, c)| c.position == i));
}

#[test]
fn test_scenario_second_entry_matches() {
    let (a, b) = (blocks(200, 150, 7), blocks(200, 150, 8));
    let (entries, fetcher) = corpus(&[(1, "https://art.example.com/a.jpg", &a), (2, "https://art.example.com/b.jpg", &b)]);
    let outcome = search_with(fetcher).find_best(&b, &entries).unwrap();
    assert_eq!(found_id(&outcome), Some(2));
}

#[test]
fn test_query_bytes_are_decoded() {
    let (a, b) = (blocks(140, 140, 30), blocks(140, 140, 31));
    let (entries, fetcher) = corpus(&[(1, "mem://a", &a), (2, "mem://b", &b)]);
    let search = search_with(fetcher);
    let outcome = search.find_best_bytes(&png(&a), &entries).unwrap();
    assert_eq!(found_id(&outcome), Some(1));

    let err = search.find_best_bytes(b"definitely not an image", &entries).unwrap_err();
    assert!(matches!(err, SearchError::QueryDecode(_)));
}

#[test]
fn test_empty_corpus_has_no_match() {
    let search = search_with(MemoryFetcher::new());
    let outcome = search.find_best(&blocks(128, 128, 1), &[]).unwrap();
    assert!(matches!(outcome, SearchOutcome::NoMatchFound));
}

#[test]
fn test_featureless_query_has_no_match() {
    let a = blocks(128, 128, 1);
    let (entries, fetcher) = corpus(&[(1, "mem://a", &a)]);
    let blank = RasterImage::filled(128, 128, [40, 40, 40]).unwrap();
    let outcome = search_with(fetcher).find_best(&blank, &entries).unwrap();
    assert!(!outcome.is_found());
}

#[test]
fn test_ties_go_to_first_entry() {
    let query = blocks(150, 150, 40);
    let other = blocks(150, 150, 41);
    let (entries, fetcher) = corpus(&[
        (1, "mem://other", &other),
        (2, "mem://copy-1", &query),
        (3, "mem://copy-2", &query),
    ]);
    let search = search_with(fetcher);
    for _ in 0..5 {
        let report = search.search(&query, &entries).unwrap();
        assert_eq!(report.candidates[1].score, report.candidates[2].score);
        assert_eq!(found_id(&report.outcome), Some(2));
    }
}

#[test]
fn test_missing_image_aborts_search() {
    let query = blocks(128, 128, 50);
    let a = blocks(128, 128, 51);
    let (mut entries, fetcher) = corpus(&[(1, "mem://a", &a), (3, "mem://q", &query)]);
    entries.insert(1, CorpusEntry::new(2, "gone", "mem://missing"));

    let err = search_with(fetcher.clone()).find_best(&query, &entries).unwrap_err();
    match err {
        SearchError::Fetch { id, source, .. } => {
            assert_eq!(id, 2);
            assert!(matches!(source, FetchError::NotFound(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }

    let lenient = CorpusSearch::builder()
        .threads(2)
        .failure_policy(FailurePolicy::SkipFailed)
        .fetcher(Arc::new(fetcher))
        .build()
        .unwrap();
    let report = lenient.search(&query, &entries).unwrap();
    assert_eq!(report.candidates.len(), 2);
    assert_eq!(found_id(&report.outcome), Some(3));
}

#[test]
fn test_undecodable_entry_reports_decode_error() {
    let query = blocks(128, 128, 60);
    let (entries, mut fetcher) = corpus(&[(1, "mem://q", &query)]);
    fetcher.insert("mem://broken", b"GIF89a-but-not-really".to_vec());
    let mut entries = entries;
    entries.push(CorpusEntry::new(2, "broken", "mem://broken"));

    let err = search_with(fetcher).find_best(&query, &entries).unwrap_err();
    assert!(matches!(err, SearchError::Decode { id: 2, .. }), "{err:?}");
    assert_eq!(err.entry_id(), Some(2));
}

#[test]
fn test_hung_fetch_times_out() {
    let query = blocks(128, 128, 70);
    let search = CorpusSearch::builder()
        .config(simsearch::SearchConfig {
            fetch_timeout_ms: 100,
            threads: Some(2),
            ..Default::default()
        })
        .fetcher(Arc::new(HangingFetcher))
        .build()
        .unwrap();
    let entries = vec![CorpusEntry::new(1, "slow", "https://slow.example.com/a.png")];

    let started = std::time::Instant::now();
    let err = search.find_best(&query, &entries).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(4));
    match err {
        SearchError::Fetch {
            source: FetchError::Timeout { timeout, .. },
            ..
        } => assert_eq!(timeout, Duration::from_millis(100)),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_resized_corpus_copy_still_wins() {
    let big = blocks(1200, 900, 80);
    let other = blocks(1200, 900, 81);
    let (entries, fetcher) = corpus(&[(1, "mem://other", &other), (2, "mem://big", &big)]);
    let search = CorpusSearch::builder()
        .config(simsearch::SearchConfig {
            resize_corpus: true,
            ..Default::default()
        })
        .fetcher(Arc::new(fetcher))
        .build()
        .unwrap();
    let outcome = search.find_best(&big, &entries).unwrap();
    assert_eq!(found_id(&outcome), Some(2));
}

#[test]
fn test_exact_matcher_agrees() {
    let query = blocks(150, 150, 90);
    let a = blocks(150, 150, 91);
    let (entries, fetcher) = corpus(&[(1, "mem://a", &a), (2, "mem://q", &query)]);
    let search = CorpusSearch::builder()
        .threads(2)
        .matcher(Arc::new(BruteForceMatcher))
        .fetcher(Arc::new(fetcher))
        .build()
        .unwrap();
    assert_eq!(found_id(&search.find_best(&query, &entries).unwrap()), Some(2));
}

#[test]
fn test_featureless_query_still_evaluates_corpus() {
    let a = blocks(128, 128, 100);
    let (mut entries, fetcher) = corpus(&[(1, "mem://a", &a)]);
    entries.push(CorpusEntry::new(2, "gone", "mem://missing"));
    let blank = RasterImage::filled(128, 128, [40, 40, 40]).unwrap();

    let err = search_with(fetcher).find_best(&blank, &entries).unwrap_err();
    assert!(matches!(err, SearchError::Fetch { id: 2, .. }), "{err:?}");
}

#[test]
fn test_earliest_failure_is_reported() {
    let query = blocks(128, 128, 110);
    let mut entries = Vec::new();
    let mut fetcher = MemoryFetcher::new();
    for id in 1..=8u64 {
        let url = format!("mem://ok-{id}");
        fetcher.insert(&url, png(&blocks(128, 128, 110 + id as u32)));
        entries.push(CorpusEntry::new(id, format!("art {id}"), url));
    }
    entries.insert(3, CorpusEntry::new(100, "first gone", "mem://missing-1"));
    for id in 101..=104u64 {
        entries.push(CorpusEntry::new(id, "gone", format!("mem://missing-{id}")));
    }

    let search = search_with(fetcher);
    for _ in 0..5 {
        let err = search.find_best(&query, &entries).unwrap_err();
        assert_eq!(err.entry_id(), Some(100));
    }
}

#[test]
fn test_report_carries_bounded_query() {
    let big = blocks(1200, 900, 120);
    let (entries, fetcher) = corpus(&[(1, "mem://big", &big)]);
    let report = search_with(fetcher).search(&big, &entries).unwrap();
    assert_eq!((report.query.width(), report.query.height()), (800, 600));

    let best = report.outcome.best().unwrap();
    assert!(best
        .query_keypoints
        .iter()
        .all(|k| k.x < report.query.width() as f32 && k.y < report.query.height() as f32));
}
