use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sdbid::epoch::{EpochPositions, ProperMotion, SkyCoord};
use sdbid::identifier::IdentifierDeriver;

/// Uniform positions over the sphere (uniform in sin δ).
fn random_coords(rng: &mut StdRng, samples: usize) -> Vec<SkyCoord> {
    (0..samples)
        .map(|_| {
            let ra = rng.random_range(0.0..360.0);
            let sin_dec: f64 = rng.random_range(-1.0..=1.0);
            SkyCoord::new(ra, sin_dec.asin().to_degrees())
        })
        .collect()
}

fn bench_derive(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    let deriver = IdentifierDeriver::default();
    let samples = 10_000usize;

    c.bench_function("derive_identifier/random_sky", |b| {
        b.iter_batched(
            || random_coords(&mut rng, samples),
            |coords| {
                for coord in coords {
                    black_box(deriver.derive_coord(black_box(coord)));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_propagate(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let samples = 10_000usize;

    c.bench_function("epoch_positions/propagated", |b| {
        b.iter_batched(
            || {
                random_coords(&mut rng, samples)
                    .into_iter()
                    .map(|coord| {
                        let pm = ProperMotion {
                            pm_ra_cosdec: rng.random_range(-500.0..500.0),
                            pm_dec: rng.random_range(-500.0..500.0),
                        };
                        (coord, pm)
                    })
                    .collect::<Vec<_>>()
            },
            |cases| {
                for (coord, pm) in cases {
                    black_box(EpochPositions::propagated(black_box(coord), pm, 2015.5));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_derive, bench_propagate);
criterion_main!(benches);
