//! Criterion benchmarks for the se pipeline live in `benches/`.
