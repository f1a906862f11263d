use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::DynamicImage;
use photo_align::data::synthetic::patch_scene;
use photo_align::pipeline::FeatureExtractor;
use photo_align::{Aligner, SiftExtractor};

fn bench_extraction(c: &mut Criterion) {
    let scene = patch_scene(7);
    let extractor = SiftExtractor::default();

    c.bench_function("sift_extract_400x300", |b| {
        b.iter(|| extractor.extract(black_box(&scene.reference)))
    });
}

fn bench_alignment(c: &mut Criterion) {
    let scene = patch_scene(7);
    let reference = DynamicImage::ImageLuma8(scene.reference);
    let target = DynamicImage::ImageLuma8(scene.target);
    let aligner = Aligner::default();
    let frame = aligner.prepare_reference(&reference);

    c.bench_function("align_prepared_reference", |b| {
        b.iter(|| aligner.align_to(black_box(&frame), black_box(&target)))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_extraction, bench_alignment
}
criterion_main!(benches);
