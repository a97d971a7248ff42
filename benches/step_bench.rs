use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use aogmaneo_host::model::{Hierarchy, ImageEncoder};
use aogmaneo_host::{HierarchyDesc, ImageEncoderDesc, Int3, IoDesc, LayerDesc, Model, VisibleLayerDesc};

fn hierarchy(num_layers: usize) -> Hierarchy {
    let desc = HierarchyDesc::new(
        vec![IoDesc {
            size: Int3::new(4, 4, 16),
            ..Default::default()
        }],
        vec![LayerDesc::default(); num_layers],
    );
    Hierarchy::init_random(&desc).unwrap()
}

fn bench_hierarchy_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("hierarchy_step");
    let input: Vec<i32> = (0..16).map(|i| i % 16).collect();

    for num_layers in [1, 2, 4] {
        let mut h = hierarchy(num_layers);

        group.bench_with_input(BenchmarkId::from_parameter(num_layers), &num_layers, |b, _| {
            b.iter(|| h.step(black_box(&[&input]), true, 0.0, 0.0).unwrap())
        });
    }

    group.finish();
}

fn bench_sample_prediction(c: &mut Criterion) {
    let mut h = hierarchy(2);
    h.step(&[vec![3; 16]], true, 0.0, 0.0).unwrap();

    c.bench_function("sample_prediction", |b| {
        b.iter(|| h.sample_prediction(0, black_box(0.5)).unwrap())
    });
}

fn bench_serialize(c: &mut Criterion) {
    let h = hierarchy(2);

    c.bench_function("serialize_to_buffer", |b| b.iter(|| h.serialize_to_buffer().unwrap()));

    let bytes = h.serialize_to_buffer().unwrap();
    c.bench_function("from_buffer", |b| {
        b.iter(|| Hierarchy::from_buffer(black_box(&bytes)).unwrap())
    });
}

fn bench_image_encoder_step(c: &mut Criterion) {
    let desc = ImageEncoderDesc {
        hidden_size: Int3::new(8, 8, 16),
        visible_layer_descs: vec![VisibleLayerDesc {
            size: Int3::new(16, 16, 3),
            radius: 3,
        }],
    };
    let mut e = ImageEncoder::init_random(&desc).unwrap();
    let image: Vec<u8> = (0..16 * 16 * 3).map(|i| (i * 7 % 256) as u8).collect();

    c.bench_function("image_encoder_step", |b| {
        b.iter(|| e.step(black_box(&[&image]), true, true).unwrap())
    });
}

criterion_group!(
    benches,
    bench_hierarchy_step,
    bench_sample_prediction,
    bench_serialize,
    bench_image_encoder_step,
);

criterion_main!(benches);
