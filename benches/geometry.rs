use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kms_overlay::utils::{resolve_destination, AspectRatio, Buffer, Physical, Size};
use rand::Rng;

fn criterion_benchmark(c: &mut Criterion) {
    let outputs: [Size<u32, Physical>; 4] = [
        Size::from((1280, 720)),
        Size::from((1920, 1080)),
        Size::from((1080, 1920)),
        Size::from((3840, 2160)),
    ];

    let mut rand = rand::thread_rng();
    let frames = (0..2048)
        .map(|_| {
            let size: Size<u32, Buffer> = Size::from((rand.gen_range(16..=4096), rand.gen_range(16..=2160)));
            let sar = AspectRatio::new(rand.gen_range(1..=64), rand.gen_range(1..=64));
            (size, sar)
        })
        .collect::<Vec<_>>();

    c.bench_function("resolve_destination", |b| {
        b.iter(|| {
            for output in outputs {
                for (size, sar) in &frames {
                    black_box(resolve_destination(*size, *sar, output));
                }
            }
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
