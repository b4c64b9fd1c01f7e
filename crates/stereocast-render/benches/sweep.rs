//! Sweep throughput of the CPU reference renderer.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::UVec3;
use stereocast_core::{Eye, ViewportSize, VolumeData};
use stereocast_render::{
    EyePass, ModelPlacement, RaycastParams, RenderConfig, SoftwareTileRenderer, StereoRig,
    TransferFunction, Turntable,
};

fn full_sweep(c: &mut Criterion) {
    let volume = Arc::new(VolumeData::head_phantom(UVec3::splat(64)).expect("phantom"));
    let info = volume.info();
    let lut = TransferFunction::ct_stereo().bake(info.min, info.max);
    let model = ModelPlacement::desktop().model_matrix(&Turntable::new());

    let mut group = c.benchmark_group("sweep");
    group.sample_size(20);
    for chunk in [32, 96, 256] {
        let config = RenderConfig::new(ViewportSize::new(256, 256))
            .with_chunk_size(chunk, chunk)
            .with_budget(u32::MAX);
        let inputs = StereoRig::new(&config).pose(Eye::Left).inputs(model);
        let renderer =
            SoftwareTileRenderer::new(Arc::clone(&volume), config.eye_viewport).expect("renderer");
        let mut pass = EyePass::new(Eye::Left, &config, renderer).expect("eye pass");

        for use_occlusion in [false, true] {
            let params = RaycastParams {
                use_occlusion,
                ..RaycastParams::for_volume(&info)
            };
            let id = BenchmarkId::new(
                if use_occlusion { "occlusion" } else { "plain" },
                format!("{chunk}px"),
            );
            group.bench_function(id, |b| {
                b.iter(|| {
                    pass.prepare_sweep(&inputs).expect("prepare");
                    black_box(pass.advance(&params, &lut).expect("advance"))
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, full_sweep);
criterion_main!(benches);
