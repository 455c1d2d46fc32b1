use commonware_cryptography::Sha256;
use commonware_imt::{
    indexed::{Config, Tree},
    preimage::nullifier,
};
use criterion::{criterion_group, BatchSize, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

const DEPTH: u8 = 32;

#[cfg(not(full_bench))]
const N_LEAVES: [usize; 2] = [1_000, 10_000];
#[cfg(full_bench)]
const N_LEAVES: [usize; 4] = [1_000, 10_000, 100_000, 1_000_000];

const SUBTREE_HEIGHTS: [u8; 3] = [0, 3, 6];

/// Benchmark inserting a batch of random keys into a tree that already holds `n` leaves.
fn bench_batch_insert(c: &mut Criterion) {
    for n in N_LEAVES {
        let mut rng = StdRng::seed_from_u64(0);
        let mut tree = Tree::<_, Sha256>::init(
            nullifier::Factory::<u64>::new(),
            Config {
                depth: DEPTH,
                zero_leaf: true,
            },
        )
        .unwrap();
        for chunk in (0..n).map(|_| rng.gen()).collect::<Vec<u64>>().chunks(256) {
            tree.append_leaves(chunk).unwrap();
            tree.commit();
        }

        for height in SUBTREE_HEIGHTS {
            c.bench_function(
                &format!("{}/n={} subtree_height={}", module_path!(), n, height),
                |b| {
                    b.iter_batched(
                        || {
                            (0..1usize << height)
                                .map(|_| Some(rng.gen::<u64>()))
                                .collect::<Vec<_>>()
                        },
                        |leaves| {
                            tree.batch_insert(&leaves, height, true).unwrap();
                            tree.rollback();
                        },
                        BatchSize::SmallInput,
                    )
                },
            );
        }
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_batch_insert
}
