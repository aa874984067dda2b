//! Batch conversion and RPC frame codec benchmarks.
//!
//! Measures batch throughput at several concurrency levels and the frame
//! codec round trip using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use html2md_server::batch::BatchOrchestrator;
use html2md_server::convert::{ConversionLimits, ConversionRequest, HtmlConverter};
use html2md_server::rpc::codec::{read_frame, write_frame, MSG_REQUEST};
use std::io::Cursor;
use std::sync::Arc;

const MAX_FRAME: u32 = 4 * 1024 * 1024;

fn sample_document(i: usize) -> String {
    format!(
        "<html><head><title>Doc {i}</title></head><body>\
         <h1>Heading {i}</h1><p>Some <strong>bold</strong> and <em>italic</em> text \
         with a <a href=\"/page/{i}\">link</a>.</p>\
         <ul><li>one</li><li>two</li><li>three</li></ul>\
         <pre><code class=\"language-rust\">fn main() {{ println!(\"{i}\"); }}</code></pre>\
         </body></html>"
    )
}

fn bench_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let items: Vec<ConversionRequest> = (0..100).map(|i| ConversionRequest::new(sample_document(i))).collect();

    let mut group = c.benchmark_group("run_batch_100");
    for concurrency in [1usize, 4, 16] {
        let orchestrator = BatchOrchestrator::new(
            Arc::new(HtmlConverter::new()),
            ConversionLimits::default(),
            concurrency,
        );
        group.bench_with_input(BenchmarkId::from_parameter(concurrency), &items, |b, items| {
            b.iter(|| {
                rt.block_on(async {
                    orchestrator
                        .run_batch(black_box(items.clone()))
                        .await
                        .unwrap()
                })
            });
        });
    }
    group.finish();
}

fn bench_frame_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let payload_sizes: &[usize] = &[64, 4096, 65536];

    let mut group = c.benchmark_group("frame_round_trip");
    for &size in payload_sizes {
        let payload = vec![0xABu8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, p| {
            b.iter(|| {
                rt.block_on(async {
                    let mut buf = Vec::with_capacity(size + 5);
                    write_frame(&mut buf, MSG_REQUEST, black_box(p)).await.unwrap();
                    let mut cursor = Cursor::new(buf);
                    read_frame(&mut cursor, MAX_FRAME).await.unwrap()
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_batch, bench_frame_round_trip);
criterion_main!(benches);
