use criterion::{black_box, criterion_group, criterion_main, Criterion};
use media_transcriber::transcription::{extract_text, format_time, SRTFormatter};
use media_transcriber::{SRTGenerator, Segment};

fn segments(count: usize) -> Vec<Segment> {
    (0..count)
        .map(|i| {
            let start = i as f64 * 4.25;
            Segment::new(start, start + 3.5, format!(" Segment {} of the recorded lecture", i + 1))
        })
        .collect()
}

fn bench_time_formatting(c: &mut Criterion) {
    c.bench_function("format_time", |b| {
        b.iter(|| {
            black_box(format_time(black_box(3661.5)));
            black_box(format_time(black_box(0.0004)));
        })
    });

    c.bench_function("parse_timestamp", |b| {
        b.iter(|| black_box(SRTFormatter::parse_timestamp(black_box("01:01:01,500"))))
    });
}

fn bench_srt_generation(c: &mut Criterion) {
    let small = segments(10);
    let large = segments(1000);

    c.bench_function("srt_small_file", |b| {
        b.iter(|| black_box(SRTGenerator::from_segments(&small).generate()))
    });

    c.bench_function("srt_large_file", |b| {
        b.iter(|| black_box(SRTGenerator::from_segments(&large).generate()))
    });
}

fn bench_text_extraction(c: &mut Criterion) {
    let document = SRTGenerator::from_segments(&segments(1000)).generate();

    c.bench_function("extract_text_large_file", |b| {
        b.iter(|| black_box(extract_text(black_box(&document))))
    });
}

criterion_group!(benches, bench_time_formatting, bench_srt_generation, bench_text_extraction);
criterion_main!(benches);
