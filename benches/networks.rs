//! Network construction and forward benchmarks
//!
//! - Conv layers of each arity
//! - Fan-in reconciliation of mixed-rank inputs
//! - Building a ConvNet (includes the shape probe)
//! - End-to-end forward through a multi-input network

use composenet::models::{CollectingDiagnostics, ShapeDescriptor, reconcile};
use composenet::nn::ConvNd;
use composenet::{ConvNet, DenseNet, Module, NetInput, Network, RawTensor, Tensor};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::rc::Rc;

fn sine_tensor(shape: &[usize]) -> Tensor {
    let size: usize = shape.iter().product();
    let data: Vec<f32> = (0..size).map(|i| (i as f32 * 0.01).sin()).collect();
    RawTensor::new(data, shape, false)
}

fn digits_config() -> Value {
    json!({"conv_units": [
        {"in_channels": 1, "out_channels": 16, "kernel_size": [5, 5], "pool_size": 2, "stride": 2},
        {"in_channels": 16, "out_channels": 1, "kernel_size": [5, 5], "stride": 2, "padding": 2}
    ]})
}

// ===== CONV LAYERS =====

fn bench_conv_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv_forward");

    group.bench_function("conv1d_k5_len256", |b| {
        let layer = ConvNd::new(4, 8, &[5], &[1], &[2], true).unwrap();
        let input = sine_tensor(&[8, 4, 256]);
        b.iter(|| black_box(&layer).forward(black_box(&input)));
    });

    group.bench_function("conv2d_k5_28x28", |b| {
        let layer = ConvNd::new(1, 16, &[5, 5], &[2, 2], &[0, 0], true).unwrap();
        let input = sine_tensor(&[8, 1, 28, 28]);
        b.iter(|| black_box(&layer).forward(black_box(&input)));
    });

    group.bench_function("conv3d_k3_16cubed", |b| {
        let layer = ConvNd::new(1, 4, &[3, 3, 3], &[1, 1, 1], &[0, 0, 0], true).unwrap();
        let input = sine_tensor(&[2, 1, 16, 16, 16]);
        b.iter(|| black_box(&layer).forward(black_box(&input)));
    });

    group.finish();
}

// ===== RECONCILIATION =====

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    group.bench_function("spatial_2d_and_1d", |b| {
        let dims = [ShapeDescriptor::from([16, 8, 8]), ShapeDescriptor::from([12, 4])];
        b.iter(|| reconcile(black_box(&dims)));
    });

    group.bench_function("spatial_3d_and_flat", |b| {
        let dims = [
            ShapeDescriptor::from([64, 8, 8, 8]),
            ShapeDescriptor::flat(50),
        ];
        b.iter(|| reconcile(black_box(&dims)));
    });

    group.bench_function("apply_batch_32", |b| {
        let dims = [ShapeDescriptor::from([16, 8, 8]), ShapeDescriptor::flat(200)];
        let r = reconcile(&dims).unwrap();
        let inputs = vec![sine_tensor(&[32, 16, 8, 8]), sine_tensor(&[32, 200])];
        b.iter(|| r.apply(black_box(&inputs)));
    });

    group.finish();
}

// ===== NETWORKS =====

fn bench_build(c: &mut Criterion) {
    c.bench_function("convnet_build_digits", |b| {
        b.iter(|| {
            let sink = CollectingDiagnostics::new();
            ConvNet::builder("digits")
                .in_dim([1, 28, 28])
                .config(digits_config())
                .num_classes(10)
                .diagnostics(&sink)
                .build()
        });
    });
}

fn bench_network_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("network_forward");

    group.bench_function("convnet_digits_batch_16", |b| {
        let net = ConvNet::builder("digits")
            .in_dim([1, 28, 28])
            .config(digits_config())
            .num_classes(10)
            .build()
            .unwrap();
        let input = NetInput::from(sine_tensor(&[16, 1, 28, 28]));
        b.iter(|| net.forward_pass(black_box(&input), true));
    });

    group.bench_function("fan_in_conv_and_dense", |b| {
        let conv: Rc<dyn Network> = Rc::new(
            ConvNet::builder("conv")
                .in_dim([1, 16, 16])
                .config(json!({"conv_units": [
                    {"in_channels": 1, "out_channels": 8, "kernel_size": [3, 3], "stride": 2}
                ]}))
                .build()
                .unwrap(),
        );
        let dense: Rc<dyn Network> = Rc::new(
            DenseNet::builder("dense")
                .in_dim([32])
                .config(json!({"dense_units": [64]}))
                .build()
                .unwrap(),
        );
        let net = ConvNet::builder("fan_in")
            .input_network(&conv)
            .input_network(&dense)
            .config(json!({"conv_units": [
                {"in_channels": 1, "out_channels": 4, "kernel_size": [3, 3]}
            ]}))
            .num_classes(10)
            .build()
            .unwrap();
        let input = NetInput::from(vec![
            sine_tensor(&[8, 1, 16, 16]).into(),
            sine_tensor(&[8, 32]).into(),
        ]);
        b.iter(|| net.forward_pass(black_box(&input), false));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_conv_forward,
    bench_reconcile,
    bench_build,
    bench_network_forward
);

criterion_main!(benches);
