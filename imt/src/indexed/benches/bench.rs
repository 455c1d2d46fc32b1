use criterion::criterion_main;

mod batch_insert;

criterion_main!(batch_insert::benches, prove_low_leaf::benches);
